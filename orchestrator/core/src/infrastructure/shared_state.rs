// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared State Directory
//!
//! File-backed implementations of [`MarkerStore`] and [`CoreStatusStore`]
//! over a directory mounted into both cores and the System Monitor:
//!
//! | File | Writer | Contents |
//! |------|--------|----------|
//! | `active_core.json` | System Monitor | [`ActiveCoreMarker`] |
//! | `core-<id>.status.json` | owning core | [`CoreState`] |
//!
//! Every write goes to a temporary sibling and is renamed into place, so a
//! reader sees either the previous or the next complete record.

use crate::domain::core::{
    ActiveCoreMarker, CoreId, CoreState, CoreStatusStore, MarkerStore, StoreError,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const MARKER_FILE: &str = "active_core.json";

/// Write `value` as JSON to `path` via temp file + rename.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Io(format!("{} has no parent directory", path.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Io(format!("invalid file name: {}", path.display())))?;
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct FileMarkerStore {
    path: PathBuf,
    // serializes read-modify-write within the single writer process
    write_lock: Mutex<()>,
}

impl FileMarkerStore {
    pub fn new(shared_dir: impl AsRef<Path>) -> Self {
        Self {
            path: shared_dir.as_ref().join(MARKER_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MarkerStore for FileMarkerStore {
    async fn read(&self) -> Result<Option<ActiveCoreMarker>, StoreError> {
        read_json(&self.path).await
    }

    async fn designate(&self, core_id: &CoreId) -> Result<(ActiveCoreMarker, bool), StoreError> {
        let _guard = self.write_lock.lock().await;

        // an unreadable marker is replaced rather than blocking designation
        let current = match self.read().await {
            Ok(current) => current,
            Err(StoreError::Corrupt(reason)) => {
                tracing::warn!(path = %self.path.display(), "Replacing corrupt marker: {}", reason);
                None
            }
            Err(e) => return Err(e),
        };

        let (version, changed) = match &current {
            Some(m) if &m.core_id == core_id => (m.version, false),
            Some(m) => (m.version + 1, true),
            None => (1, true),
        };

        let marker = ActiveCoreMarker {
            core_id: core_id.clone(),
            version,
            updated_at: Utc::now(),
        };
        write_json_atomic(&self.path, &marker).await?;
        Ok((marker, changed))
    }
}

pub struct FileCoreStatusStore {
    dir: PathBuf,
}

impl FileCoreStatusStore {
    pub fn new(shared_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: shared_dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, core_id: &CoreId) -> PathBuf {
        self.dir.join(format!("core-{}.status.json", core_id))
    }
}

#[async_trait]
impl CoreStatusStore for FileCoreStatusStore {
    async fn publish(&self, state: &CoreState) -> Result<(), StoreError> {
        write_json_atomic(&self.path_for(&state.core_id), state).await
    }

    async fn load(&self, core_id: &CoreId) -> Result<Option<CoreState>, StoreError> {
        read_json(&self.path_for(core_id)).await
    }
}
