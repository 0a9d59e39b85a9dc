// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::{InstanceId, RuntimeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(pub String);

impl SandboxId {
    /// `sandbox_<feature>_<8 hex>`; never reused.
    pub fn generate(feature_id: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("sandbox_{}_{}", feature_id, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInstance {
    pub sandbox_id: SandboxId,
    pub backing_container_id: InstanceId,
    pub owning_feature_id: String,
    pub created_at: DateTime<Utc>,
    /// Host directory mounted read-only into the container.
    pub code_path: PathBuf,
    /// Host directory mounted writable; private to this sandbox.
    pub log_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Invalid sandbox request: {0}")]
    InvalidRequest(String),
    #[error("Failed to materialize sandbox artifacts: {0}")]
    Artifacts(String),
    #[error("Failed to launch sandbox container: {0}")]
    Launch(#[from] RuntimeError),
}
