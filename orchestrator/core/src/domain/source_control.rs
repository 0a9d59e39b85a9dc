// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Source-control port. Only the Command Dispatcher and the Recovery
// Supervisor's reachability probe talk to it.

use crate::domain::command::{FileChange, FileWriteMode, NewProject};
use async_trait::async_trait;

#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn create_project(&self, project: &NewProject) -> Result<serde_json::Value, SourceControlError>;

    async fn write_file(
        &self,
        mode: FileWriteMode,
        change: &FileChange,
    ) -> Result<serde_json::Value, SourceControlError>;

    async fn pipeline_status(
        &self,
        project_id: &str,
        pipeline_id: &str,
    ) -> Result<serde_json::Value, SourceControlError>;

    /// Reachability check, bounded by the adapter's probe timeout.
    async fn probe(&self) -> Result<(), SourceControlError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceControlError {
    #[error("Source control unreachable: {0}")]
    Network(String),

    #[error("Source control request timed out")]
    Timeout,

    #[error("Source control API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
}
