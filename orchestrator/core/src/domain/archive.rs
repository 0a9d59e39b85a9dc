// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::core::StoreError;
use crate::domain::service::SystemSnapshot;
use async_trait::async_trait;
use std::path::PathBuf;

/// Append-only archive of system snapshots plus the backup artifacts that
/// live beside them.
#[async_trait]
pub trait SnapshotArchive: Send + Sync {
    /// Write `snapshot` under a new timestamped name. Never overwrites.
    async fn archive(&self, snapshot: &SystemSnapshot) -> Result<PathBuf, StoreError>;

    async fn load(&self, path: &std::path::Path) -> Result<SystemSnapshot, StoreError>;

    /// Most recent full-system backup, chosen by the timestamp in its name.
    async fn latest_backup(&self) -> Result<Option<PathBuf>, StoreError>;

    /// Path for a new backup artifact taken now.
    fn next_backup_path(&self) -> PathBuf;
}
