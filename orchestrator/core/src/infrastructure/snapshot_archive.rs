// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::archive::SnapshotArchive;
use crate::domain::core::StoreError;
use crate::domain::service::SystemSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const SNAPSHOT_PREFIX: &str = "system_state_";
const BACKUP_PREFIX: &str = "system_backup_";
const BACKUP_SUFFIX: &str = ".tar.gz";

/// Lexicographically sortable UTC timestamp used in artifact names.
fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Snapshots and backups in one directory, named by UTC timestamp.
pub struct FileSnapshotArchive {
    dir: PathBuf,
}

impl FileSnapshotArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SnapshotArchive for FileSnapshotArchive {
    async fn archive(&self, snapshot: &SystemSnapshot) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let base = format!("{}{}", SNAPSHOT_PREFIX, stamp(snapshot.timestamp));

        for attempt in 0..100u32 {
            let name = if attempt == 0 {
                format!("{}.json", base)
            } else {
                format!("{}_{}.json", base, attempt)
            };
            let path = self.dir.join(name);
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match file {
                Ok(mut file) => {
                    file.write_all(&bytes).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Io(format!("could not allocate a snapshot name for {}", base)))
    }

    async fn load(&self, path: &Path) -> Result<SystemSnapshot, StoreError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn latest_backup(&self) -> Result<Option<PathBuf>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(BACKUP_SUFFIX) {
                continue;
            }
            if latest.as_ref().map_or(true, |current| name > *current) {
                latest = Some(name);
            }
        }
        Ok(latest.map(|name| self.dir.join(name)))
    }

    fn next_backup_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", BACKUP_PREFIX, stamp(Utc::now()), BACKUP_SUFFIX))
    }
}
