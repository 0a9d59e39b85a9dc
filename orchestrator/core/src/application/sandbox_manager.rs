// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sandbox Manager
//!
//! Ephemeral single-container sandboxes for ad hoc code execution.
//!
//! Each sandbox gets a fresh id, a host directory holding the submitted
//! code (mounted read-only at `/code`) and its own writable log directory
//! (mounted at `/logs`). A monitor task per sandbox waits for the container
//! to exit, or stops it once the configured max lifetime has elapsed.
//!
//! Cleanup (capture logs, append them to the per-feature log file, remove
//! the container and the code directory) is done by whichever path removes
//! the sandbox from the registry first. An explicit [`SandboxManager::stop`]
//! claims the entry before stopping the container and cleans up inline; the
//! monitor task only reaps sandboxes nobody claimed. The registry removal is
//! atomic, so cleanup runs exactly once.

use crate::domain::error::OrchestratorError;
use crate::domain::runtime::{ContainerRuntime, Mount, RunSpec};
use crate::domain::sandbox::{SandboxError, SandboxId, SandboxInstance};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

const CODE_FILE: &str = "main.py";

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub image: String,
    pub command: Vec<String>,
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    pub network: Option<String>,
    pub stop_timeout: Duration,
    pub max_lifetime: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxView {
    pub sandbox_id: SandboxId,
    pub feature_id: String,
    pub container_id: String,
    pub created_at: DateTime<Utc>,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub sandbox_id: String,
    pub already_gone: bool,
}

pub struct SandboxManager {
    settings: SandboxSettings,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Mutex<HashMap<SandboxId, SandboxInstance>>,
}

impl SandboxManager {
    pub fn new(settings: SandboxSettings, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            settings,
            runtime,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_registered(&self, id: &SandboxId) -> bool {
        self.registry.lock().contains_key(id)
    }

    /// Per-feature file the final logs of every sandbox are appended to.
    pub fn feature_log_path(&self, feature_id: &str) -> PathBuf {
        self.settings.log_dir.join(format!("sandbox_{}.log", feature_id))
    }

    pub async fn create(self: &Arc<Self>, feature_id: &str, code: &str) -> Result<SandboxInstance, SandboxError> {
        if feature_id.is_empty()
            || !feature_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(SandboxError::InvalidRequest(
                "feature_id must be non-empty and contain only [A-Za-z0-9_.-]".to_string(),
            ));
        }
        if code.trim().is_empty() {
            return Err(SandboxError::InvalidRequest("code must not be empty".to_string()));
        }

        let sandbox_id = SandboxId::generate(feature_id);
        let code_path = self.settings.work_dir.join(sandbox_id.as_str());
        let log_dir = self.settings.log_dir.join(sandbox_id.as_str());

        let materialized = async {
            tokio::fs::create_dir_all(&code_path).await?;
            tokio::fs::write(code_path.join(CODE_FILE), code).await?;
            tokio::fs::create_dir_all(&log_dir).await
        }
        .await;
        if let Err(e) = materialized {
            remove_dir(&code_path).await;
            remove_dir(&log_dir).await;
            return Err(SandboxError::Artifacts(e.to_string()));
        }

        let spec = RunSpec {
            name: sandbox_id.to_string(),
            image: self.settings.image.clone(),
            command: self.settings.command.clone(),
            mounts: vec![
                Mount {
                    source: code_path.clone(),
                    target: "/code".to_string(),
                    read_only: true,
                },
                Mount {
                    source: log_dir.clone(),
                    target: "/logs".to_string(),
                    read_only: false,
                },
            ],
            network: self.settings.network.clone(),
            env: HashMap::from([
                ("SANDBOX_ID".to_string(), sandbox_id.to_string()),
                ("FEATURE_ID".to_string(), feature_id.to_string()),
            ]),
        };

        let container = match self.runtime.run(spec).await {
            Ok(container) => container,
            Err(e) => {
                error!(sandbox_id = %sandbox_id, "Sandbox launch failed: {}", e);
                remove_dir(&code_path).await;
                remove_dir(&log_dir).await;
                return Err(SandboxError::Launch(e));
            }
        };

        let instance = SandboxInstance {
            sandbox_id: sandbox_id.clone(),
            backing_container_id: container,
            owning_feature_id: feature_id.to_string(),
            created_at: Utc::now(),
            code_path,
            log_dir,
        };
        let active = {
            let mut registry = self.registry.lock();
            registry.insert(sandbox_id.clone(), instance.clone());
            registry.len()
        };
        metrics::gauge!("duplex_sandboxes_active").set(active as f64);
        info!(sandbox_id = %sandbox_id, feature = %feature_id, "Sandbox created");

        let manager = Arc::clone(self);
        let monitored = instance.clone();
        tokio::spawn(async move {
            manager.monitor(monitored).await;
        });

        Ok(instance)
    }

    async fn monitor(&self, instance: SandboxInstance) {
        let sandbox_id = instance.sandbox_id.clone();
        tokio::select! {
            result = self.runtime.wait(&instance.backing_container_id) => match result {
                Ok(code) => info!(sandbox_id = %sandbox_id, exit_code = code, "Sandbox exited"),
                Err(e) => warn!(sandbox_id = %sandbox_id, "Lost track of sandbox container: {}", e),
            },
            _ = tokio::time::sleep(self.settings.max_lifetime) => {
                warn!(
                    sandbox_id = %sandbox_id,
                    max_lifetime_seconds = self.settings.max_lifetime.as_secs(),
                    "Sandbox exceeded its max lifetime, stopping"
                );
                if let Err(e) = self
                    .runtime
                    .stop(instance.backing_container_id.as_str(), self.settings.stop_timeout)
                    .await
                {
                    warn!(sandbox_id = %sandbox_id, "Failed to stop expired sandbox: {}", e);
                }
            }
        }
        self.reap(&sandbox_id).await;
    }

    /// Take `id` out of the registry. Only the caller that gets the
    /// instance back may clean it up.
    fn claim(&self, id: &SandboxId) -> Option<SandboxInstance> {
        let mut registry = self.registry.lock();
        let claimed = registry.remove(id);
        metrics::gauge!("duplex_sandboxes_active").set(registry.len() as f64);
        claimed
    }

    /// Clean up `id` unless an explicit stop already claimed it.
    async fn reap(&self, id: &SandboxId) {
        if let Some(instance) = self.claim(id) {
            self.cleanup(&instance).await;
        }
    }

    async fn cleanup(&self, instance: &SandboxInstance) {
        let sandbox_id = &instance.sandbox_id;
        match self.runtime.logs(instance.backing_container_id.as_str(), None).await {
            Ok(logs) => {
                if let Err(e) = self.append_feature_log(instance, &logs).await {
                    warn!(sandbox_id = %sandbox_id, "Failed to append sandbox logs: {}", e);
                }
            }
            Err(e) => debug!(sandbox_id = %sandbox_id, "No final logs captured: {}", e),
        }

        if let Err(e) = self.runtime.remove(&instance.backing_container_id).await {
            if !e.is_not_found() {
                warn!(sandbox_id = %sandbox_id, "Failed to remove sandbox container: {}", e);
            }
        }
        remove_dir(&instance.code_path).await;
        // keeps anything the sandbox wrote to /logs
        let _ = tokio::fs::remove_dir(&instance.log_dir).await;
        info!(sandbox_id = %sandbox_id, "Sandbox cleaned up");
    }

    async fn append_feature_log(&self, instance: &SandboxInstance, logs: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.settings.log_dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.feature_log_path(&instance.owning_feature_id))
            .await?;
        let header = format!(
            "=== {} finished at {} ===\n",
            instance.sandbox_id,
            Utc::now().to_rfc3339()
        );
        file.write_all(header.as_bytes()).await?;
        file.write_all(logs.as_bytes()).await?;
        if !logs.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        file.flush().await
    }

    /// Gracefully stop a sandbox and clean it up before returning. Unknown
    /// or already-reaped ids succeed with `already_gone`.
    pub async fn stop(&self, sandbox_id: &str) -> Result<StopOutcome, OrchestratorError> {
        let id = SandboxId(sandbox_id.to_string());
        // claimed before the container stops, so the monitor task's reap is a no-op
        let Some(instance) = self.claim(&id) else {
            return Ok(StopOutcome {
                sandbox_id: sandbox_id.to_string(),
                already_gone: true,
            });
        };

        let stopped = tokio::time::timeout(
            self.settings.stop_timeout + Duration::from_secs(5),
            self.runtime
                .stop(instance.backing_container_id.as_str(), self.settings.stop_timeout),
        )
        .await;
        let stop_error = match stopped {
            Ok(Ok(())) => None,
            Ok(Err(e)) if e.is_not_found() => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("stop timed out".to_string()),
        };

        self.cleanup(&instance).await;
        if let Some(reason) = stop_error {
            warn!(sandbox_id = %sandbox_id, "Sandbox stop was not clean: {}", reason);
            return Err(OrchestratorError::SandboxFailure(format!(
                "sandbox {} removed but stop failed: {}",
                sandbox_id, reason
            )));
        }
        Ok(StopOutcome {
            sandbox_id: sandbox_id.to_string(),
            already_gone: false,
        })
    }

    pub async fn status(&self) -> Vec<SandboxView> {
        let instances: Vec<SandboxInstance> = self.registry.lock().values().cloned().collect();
        let mut views = Vec::with_capacity(instances.len());
        for instance in instances {
            let state = match self.runtime.get(instance.backing_container_id.as_str()).await {
                Ok(info) => info.state,
                Err(e) if e.is_not_found() => "gone".to_string(),
                Err(_) => "unknown".to_string(),
            };
            views.push(SandboxView {
                sandbox_id: instance.sandbox_id,
                feature_id: instance.owning_feature_id,
                container_id: instance.backing_container_id.0,
                created_at: instance.created_at,
                state,
            });
        }
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        views
    }

    /// Stop every live sandbox; used on process shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<SandboxId> = self.registry.lock().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(id.as_str()).await {
                warn!(sandbox_id = %id, "Shutdown stop failed: {}", e);
            }
        }
    }
}

async fn remove_dir(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove sandbox directory: {}", e);
        }
    }
}
