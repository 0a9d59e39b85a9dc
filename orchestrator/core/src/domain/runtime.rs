// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Container Runtime Port
//!
//! Minimal contract over the container engine used by the Core Manager,
//! Recovery Supervisor and Sandbox Manager. The Docker adapter lives in
//! `crate::infrastructure::runtime`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Container as reported by the engine's list/inspect calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Engine state string: `running`, `exited`, `created`, `restarting`, ...
    pub state: String,
    pub image: String,
    /// Healthcheck status when the image declares one, otherwise `unknown`.
    pub health: String,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Detached container launch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<Mount>,
    pub network: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// What the recovery path should do with a container in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    None,
    Start,
    Restart,
}

impl RepairAction {
    pub fn for_state(state: &str) -> Self {
        match state {
            "running" => RepairAction::None,
            "exited" | "created" | "stopped" => RepairAction::Start,
            // crash-looping or wedged
            _ => RepairAction::Restart,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container not found: {0}")]
    NotFound(String),
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to spawn container: {0}")]
    SpawnFailed(String),
    #[error("Container operation failed: {0}")]
    OperationFailed(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers; `all` includes stopped ones.
    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>, RuntimeError>;
    async fn get(&self, name: &str) -> Result<ContainerInfo, RuntimeError>;
    async fn start(&self, name: &str) -> Result<(), RuntimeError>;
    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError>;
    async fn restart(&self, name: &str) -> Result<(), RuntimeError>;
    async fn logs(&self, name: &str, tail: Option<usize>) -> Result<String, RuntimeError>;
    /// Create and start a detached container.
    async fn run(&self, spec: RunSpec) -> Result<InstanceId, RuntimeError>;
    /// Block until the container exits and return its exit code.
    async fn wait(&self, id: &InstanceId) -> Result<i64, RuntimeError>;
    async fn remove(&self, id: &InstanceId) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_action_by_state() {
        assert_eq!(RepairAction::for_state("running"), RepairAction::None);
        assert_eq!(RepairAction::for_state("exited"), RepairAction::Start);
        assert_eq!(RepairAction::for_state("created"), RepairAction::Start);
        assert_eq!(RepairAction::for_state("restarting"), RepairAction::Restart);
        assert_eq!(RepairAction::for_state("dead"), RepairAction::Restart);
    }
}
