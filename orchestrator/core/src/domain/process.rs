// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Host process execution and multi-service environment lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    Spawn(String),
    #[error("Process timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run `command_line` through the shell. A non-zero exit is an `Ok`
    /// output; only spawn failures and timeouts are errors.
    async fn execute(
        &self,
        command_line: &str,
        working_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Environment command exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Brings a declared environment (compose file in `dir`) up and down.
#[async_trait]
pub trait EnvironmentDriver: Send + Sync {
    async fn up(&self, dir: &Path) -> Result<ProcessOutput, EnvironmentError>;
    async fn down(&self, dir: &Path) -> Result<ProcessOutput, EnvironmentError>;
}

/// File name the environment definition is written to inside its directory.
pub const ENVIRONMENT_FILE: &str = "docker-compose.yml";
