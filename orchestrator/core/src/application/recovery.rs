// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Recovery Supervisor
//!
//! Independent loop that snapshots every container, archives the snapshot,
//! verifies system integrity and, when integrity fails, attempts repair.
//!
//! Integrity requires every critical service to be present and `running`,
//! and then the source-control API to answer a reachability probe. The
//! service checks run first; when they already failed the probe is skipped.
//!
//! Repair is best-effort per service: `start` a stopped container,
//! `restart` a wedged one, and fall back to restoring the service from the
//! newest full-system backup. One service failing to recover never stops
//! the others.

use crate::application::supervisor::Heartbeat;
use crate::domain::activity::ActivityRecord;
use crate::domain::archive::SnapshotArchive;
use crate::domain::error::OrchestratorError;
use crate::domain::process::ProcessExecutor;
use crate::domain::repository::ActivityRepository;
use crate::domain::runtime::{ContainerRuntime, RepairAction};
use crate::domain::service::SystemSnapshot;
use crate::domain::source_control::SourceControl;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const ACTIVITY_SOURCE: &str = "recovery_supervisor";

#[derive(Debug, Clone)]
pub struct RecoverySettings {
    pub interval: Duration,
    pub retry_backoff: Duration,
    pub critical_services: Vec<String>,
    pub probe_timeout: Duration,
    /// `{target}` is replaced with the new backup path.
    pub backup_command: String,
    /// `{backup}` is replaced with the backup path.
    pub restore_command: String,
    /// `{service}` and `{backup}` are replaced.
    pub service_restore_command: String,
    pub backup_interval: Duration,
    pub command_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub integral: bool,
    pub violations: Vec<String>,
    /// `false` when the reachability probe was skipped.
    pub probed_source_control: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    Started,
    Restarted,
    Restored { backup: PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecovery {
    pub service: String,
    #[serde(flatten)]
    pub action: RecoveryAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub timestamp: DateTime<Utc>,
    pub snapshot_path: Option<PathBuf>,
    pub integrity: IntegrityReport,
    pub recoveries: Vec<ServiceRecovery>,
}

pub struct RecoverySupervisor {
    settings: RecoverySettings,
    runtime: Arc<dyn ContainerRuntime>,
    archive: Arc<dyn SnapshotArchive>,
    source_control: Arc<dyn SourceControl>,
    executor: Arc<dyn ProcessExecutor>,
    activity: Arc<dyn ActivityRepository>,
    last_report: RwLock<Option<RecoveryReport>>,
}

impl RecoverySupervisor {
    pub fn new(
        settings: RecoverySettings,
        runtime: Arc<dyn ContainerRuntime>,
        archive: Arc<dyn SnapshotArchive>,
        source_control: Arc<dyn SourceControl>,
        executor: Arc<dyn ProcessExecutor>,
        activity: Arc<dyn ActivityRepository>,
    ) -> Self {
        Self {
            settings,
            runtime,
            archive,
            source_control,
            executor,
            activity,
            last_report: RwLock::new(None),
        }
    }

    pub fn last_report(&self) -> Option<RecoveryReport> {
        self.last_report.read().clone()
    }

    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> Result<SystemSnapshot, OrchestratorError> {
        let containers = self.runtime.list(true).await?;
        Ok(SystemSnapshot::capture(&containers, Utc::now()))
    }

    pub async fn verify_integrity(&self, snapshot: &SystemSnapshot) -> IntegrityReport {
        let mut violations = Vec::new();
        for service in &self.settings.critical_services {
            match snapshot.get(service) {
                None => violations.push(format!("critical service {} is missing", service)),
                Some(status) if !status.is_running() => violations.push(format!(
                    "critical service {} is not running ({})",
                    service, status.running_state
                )),
                Some(_) => {}
            }
        }
        if !violations.is_empty() {
            return IntegrityReport {
                integral: false,
                violations,
                probed_source_control: false,
            };
        }

        match tokio::time::timeout(self.settings.probe_timeout, self.source_control.probe()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => violations.push(format!("source control unreachable: {}", e)),
            Err(_) => violations.push(format!(
                "source control probe timed out after {}s",
                self.settings.probe_timeout.as_secs()
            )),
        }
        IntegrityReport {
            integral: violations.is_empty(),
            violations,
            probed_source_control: true,
        }
    }

    /// Repair every non-running service plus every missing critical one.
    pub async fn recover(&self, snapshot: &SystemSnapshot) -> Vec<ServiceRecovery> {
        let mut recoveries = Vec::new();

        for (name, status) in &snapshot.services {
            let repair = match RepairAction::for_state(&status.running_state) {
                RepairAction::None => continue,
                RepairAction::Start => self.runtime.start(name).await.map(|_| RecoveryAction::Started),
                RepairAction::Restart => self.runtime.restart(name).await.map(|_| RecoveryAction::Restarted),
            };
            let action = match repair {
                Ok(action) => {
                    info!(service = %name, "Service repaired: {:?}", action);
                    action
                }
                Err(e) => {
                    warn!(service = %name, "Repair failed, restoring from backup: {}", e);
                    self.restore_service(name).await
                }
            };
            recoveries.push(ServiceRecovery {
                service: name.clone(),
                action,
            });
        }

        for service in &self.settings.critical_services {
            if snapshot.get(service).is_none() {
                warn!(service = %service, "Critical service missing, restoring from backup");
                let action = self.restore_service(service).await;
                recoveries.push(ServiceRecovery {
                    service: service.clone(),
                    action,
                });
            }
        }

        for recovery in &recoveries {
            let status = match recovery.action {
                RecoveryAction::Failed { .. } => "error",
                _ => "success",
            };
            self.record("recovery", "repair_service", status, json!(recovery)).await;
        }
        recoveries
    }

    async fn restore_service(&self, service: &str) -> RecoveryAction {
        let backup = match self.archive.latest_backup().await {
            Ok(Some(path)) => path,
            Ok(None) => {
                return RecoveryAction::Failed {
                    reason: "no backup available".to_string(),
                }
            }
            Err(e) => {
                return RecoveryAction::Failed {
                    reason: format!("backup lookup failed: {}", e),
                }
            }
        };
        let command = self
            .settings
            .service_restore_command
            .replace("{service}", service)
            .replace("{backup}", &backup.display().to_string());
        match self.run_script(&command).await {
            Ok(()) => RecoveryAction::Restored { backup },
            Err(reason) => RecoveryAction::Failed { reason },
        }
    }

    async fn run_script(&self, command: &str) -> Result<(), String> {
        match self.executor.execute(command, None, self.settings.command_timeout).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(format!(
                "exit code {}: {}",
                output.exit_code,
                output.stderr.trim()
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Snapshot, archive, verify and, when needed, repair.
    pub async fn run_cycle(&self) -> Result<RecoveryReport, OrchestratorError> {
        let snapshot = self.snapshot().await?;
        let snapshot_path = match self.archive.archive(&snapshot).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Failed to archive system snapshot: {}", e);
                None
            }
        };

        let integrity = self.verify_integrity(&snapshot).await;
        let recoveries = if integrity.integral {
            Vec::new()
        } else {
            warn!(violations = ?integrity.violations, "System integrity violated");
            self.record(
                "integrity",
                "verify",
                "violation",
                json!({ "violations": integrity.violations }),
            )
            .await;
            self.recover(&snapshot).await
        };

        let report = RecoveryReport {
            timestamp: snapshot.timestamp,
            snapshot_path,
            integrity,
            recoveries,
        };
        *self.last_report.write() = Some(report.clone());
        Ok(report)
    }

    /// Run the configured backup command against a new timestamped target.
    pub async fn create_backup(&self) -> Result<PathBuf, OrchestratorError> {
        let target = self.archive.next_backup_path();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::Internal(format!("backup dir: {}", e)))?;
        }
        let command = self
            .settings
            .backup_command
            .replace("{target}", &target.display().to_string());
        info!(target = %target.display(), "Creating system backup");
        match self.run_script(&command).await {
            Ok(()) => {
                self.record("backup", "create", "success", json!({ "path": target })).await;
                Ok(target)
            }
            Err(reason) => {
                self.record("backup", "create", "error", json!({ "error": reason })).await;
                Err(OrchestratorError::DependencyUnavailable {
                    dependency: "backup script",
                    reason,
                })
            }
        }
    }

    /// Restore the whole system from `backup`, or from the newest backup.
    pub async fn restore_system(&self, backup: Option<&Path>) -> Result<PathBuf, OrchestratorError> {
        let backup = match backup {
            Some(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(OrchestratorError::NotFound(format!("backup {}", path.display())));
                }
                path.to_path_buf()
            }
            None => self
                .archive
                .latest_backup()
                .await?
                .ok_or_else(|| OrchestratorError::NotFound("no backup available".to_string()))?,
        };
        let command = self
            .settings
            .restore_command
            .replace("{backup}", &backup.display().to_string());
        info!(backup = %backup.display(), "Restoring system from backup");
        match self.run_script(&command).await {
            Ok(()) => {
                self.record("backup", "restore_system", "success", json!({ "path": backup })).await;
                Ok(backup)
            }
            Err(reason) => {
                self.record("backup", "restore_system", "error", json!({ "error": reason })).await;
                Err(OrchestratorError::DependencyUnavailable {
                    dependency: "restore script",
                    reason,
                })
            }
        }
    }

    async fn record(&self, log_type: &str, action: &str, status: &str, details: serde_json::Value) {
        let record = ActivityRecord::new(ACTIVITY_SOURCE, log_type, action, status, details);
        if let Err(e) = self.activity.append(&record).await {
            warn!("Failed to write activity log: {}", e);
        }
    }

    /// Recovery loop body; a failed cycle shortens the wait to the retry
    /// backoff instead of the full interval.
    pub async fn run_loop(self: Arc<Self>, heartbeat: Heartbeat, cancel: CancellationToken) {
        info!(
            interval_seconds = self.settings.interval.as_secs(),
            critical_services = ?self.settings.critical_services,
            "Starting recovery loop"
        );
        let mut last_backup: Option<Instant> = None;

        loop {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    if !report.integrity.integral {
                        info!(recoveries = report.recoveries.len(), "Recovery cycle completed with repairs");
                    }
                    self.settings.interval
                }
                Err(e) => {
                    error!(
                        retry_in_seconds = self.settings.retry_backoff.as_secs(),
                        "Recovery cycle failed: {}", e
                    );
                    self.settings.retry_backoff
                }
            };

            if last_backup.map_or(true, |at| at.elapsed() >= self.settings.backup_interval) {
                if let Err(e) = self.create_backup().await {
                    warn!("Scheduled backup failed: {}", e);
                }
                last_backup = Some(Instant::now());
            }
            heartbeat.beat();

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, stopping recovery loop");
                    break;
                }
            }
        }
    }
}
