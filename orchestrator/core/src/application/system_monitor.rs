// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # System Monitor
//!
//! Polls a fixed list of components, computes the overall health score and
//! owns the active-core marker: it is the marker's only writer.
//!
//! Every poll re-asserts the current designation so cores can tell a live
//! marker from an abandoned one. When no marker exists yet and an initial
//! active core is configured, the first poll writes it.

use crate::application::supervisor::Heartbeat;
use crate::domain::activity::ActivityRecord;
use crate::domain::core::{ActiveCoreMarker, CoreClient, CoreClientError, CoreId, MarkerStore, StoreError};
use crate::domain::error::OrchestratorError;
use crate::domain::probe::HealthProbe;
use crate::domain::repository::ActivityRepository;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const ACTIVITY_SOURCE: &str = "system_monitor";

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub known_cores: Vec<CoreId>,
    pub initial_active_core: Option<CoreId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall_health: f64,
    pub components: BTreeMap<String, ComponentHealth>,
    pub active_core: Option<ActiveCoreMarker>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchOutcome {
    pub core_id: CoreId,
    /// `false` when the core was already designated.
    pub changed: bool,
    pub marker_version: u64,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("Unknown core id: {0}")]
    UnknownCore(String),
    #[error("Failed to update active core marker: {0}")]
    Marker(#[from] StoreError),
    #[error("Core {core_id} did not take over: {source}")]
    Delegation {
        core_id: CoreId,
        #[source]
        source: CoreClientError,
    },
}

impl From<SwitchError> for OrchestratorError {
    fn from(err: SwitchError) -> Self {
        match err {
            SwitchError::UnknownCore(_) => OrchestratorError::Validation(err.to_string()),
            SwitchError::Marker(e) => e.into(),
            SwitchError::Delegation { .. } => OrchestratorError::DependencyUnavailable {
                dependency: "core manager",
                reason: err.to_string(),
            },
        }
    }
}

/// `healthy / total * 100`; an empty component list is fully healthy.
pub fn health_score(healthy: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    healthy as f64 / total as f64 * 100.0
}

pub struct SystemMonitor {
    settings: MonitorSettings,
    probes: Vec<(String, Arc<dyn HealthProbe>)>,
    markers: Arc<dyn MarkerStore>,
    core_client: Arc<dyn CoreClient>,
    activity: Arc<dyn ActivityRepository>,
    latest: RwLock<HealthSummary>,
    switch_lock: tokio::sync::Mutex<()>,
}

impl SystemMonitor {
    pub fn new(
        settings: MonitorSettings,
        probes: Vec<(String, Arc<dyn HealthProbe>)>,
        markers: Arc<dyn MarkerStore>,
        core_client: Arc<dyn CoreClient>,
        activity: Arc<dyn ActivityRepository>,
    ) -> Self {
        Self {
            settings,
            probes,
            markers,
            core_client,
            activity,
            latest: RwLock::new(HealthSummary {
                overall_health: health_score(0, 0),
                components: BTreeMap::new(),
                active_core: None,
                last_updated: None,
            }),
            switch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn latest(&self) -> HealthSummary {
        self.latest.read().clone()
    }

    /// Probe every component concurrently and refresh the marker.
    pub async fn poll(&self) -> HealthSummary {
        let checks = self.probes.iter().map(|(name, probe)| {
            let probe = probe.clone();
            let name = name.clone();
            async move { (name, probe.check().await) }
        });
        let outcomes = join_all(checks).await;

        let now = Utc::now();
        let mut components = BTreeMap::new();
        for (name, outcome) in outcomes {
            metrics::gauge!("duplex_component_up", "component" => name.clone())
                .set(if outcome.healthy { 1.0 } else { 0.0 });
            if !outcome.healthy {
                warn!(component = %name, reason = ?outcome.reason, "Component unhealthy");
            }
            components.insert(
                name,
                ComponentHealth {
                    healthy: outcome.healthy,
                    reason: outcome.reason,
                    checked_at: now,
                },
            );
        }
        let healthy = components.values().filter(|c| c.healthy).count();
        let overall_health = health_score(healthy, components.len());
        metrics::gauge!("duplex_system_health").set(overall_health);

        let active_core = self.assert_marker().await;
        let summary = HealthSummary {
            overall_health,
            components,
            active_core,
            last_updated: Some(now),
        };
        *self.latest.write() = summary.clone();
        summary
    }

    /// Refresh the current designation, or write the initial one.
    async fn assert_marker(&self) -> Option<ActiveCoreMarker> {
        let _guard = self.switch_lock.lock().await;
        let target = match self.markers.read().await {
            Ok(Some(marker)) => marker.core_id,
            Ok(None) => match &self.settings.initial_active_core {
                Some(initial) => {
                    info!(core_id = %initial, "Writing initial active core designation");
                    initial.clone()
                }
                None => return None,
            },
            Err(e) => {
                error!("Active core marker unreadable; waiting for an explicit switch: {}", e);
                return None;
            }
        };

        match self.markers.designate(&target).await {
            Ok((marker, changed)) => {
                if changed {
                    self.record(
                        "switch_core",
                        "initial_designation",
                        "success",
                        json!({ "core_id": marker.core_id, "version": marker.version }),
                    )
                    .await;
                }
                Some(marker)
            }
            Err(e) => {
                error!(core_id = %target, "Failed to refresh active core marker: {}", e);
                None
            }
        }
    }

    /// Designate `target` as the active core and ask it to reconcile now.
    /// Idempotent: when `target` already holds the designation nothing
    /// changes and no core is contacted.
    pub async fn switch_core(&self, target: &str) -> Result<SwitchOutcome, SwitchError> {
        let _guard = self.switch_lock.lock().await;
        let target_id = CoreId::new(target);
        if !self.settings.known_cores.contains(&target_id) {
            self.record("switch_core", "switch", "rejected", json!({ "core_id": target, "reason": "unknown core" }))
                .await;
            return Err(SwitchError::UnknownCore(target.to_string()));
        }

        let previous = self.markers.read().await.ok().flatten();
        let (marker, changed) = match self.markers.designate(&target_id).await {
            Ok(result) => result,
            Err(e) => {
                self.record("switch_core", "switch", "error", json!({ "core_id": target, "error": e.to_string() }))
                    .await;
                return Err(e.into());
            }
        };

        if !changed {
            self.record(
                "switch_core",
                "switch",
                "noop",
                json!({ "core_id": target, "version": marker.version }),
            )
            .await;
            info!(core_id = %target_id, "Core already active, nothing to switch");
            return Ok(SwitchOutcome {
                core_id: target_id,
                changed: false,
                marker_version: marker.version,
                message: format!("Core {} is already active", target),
            });
        }

        info!(core_id = %target_id, version = marker.version, "Active core designation changed");
        let delegated = self.core_client.reconcile(&target_id).await;

        // the previous core steps down on its own next poll; nudging it only shortens the window
        if let Some(previous) = previous.filter(|p| p.core_id != target_id) {
            if let Err(e) = self.core_client.reconcile(&previous.core_id).await {
                warn!(core_id = %previous.core_id, "Previous active core not reachable: {}", e);
            }
        }

        match delegated {
            Ok(()) => {
                self.record(
                    "switch_core",
                    "switch",
                    "success",
                    json!({ "core_id": target, "version": marker.version }),
                )
                .await;
                Ok(SwitchOutcome {
                    core_id: target_id,
                    changed: true,
                    marker_version: marker.version,
                    message: format!("Switched active core to {}", target),
                })
            }
            Err(e) => {
                self.record(
                    "switch_core",
                    "switch",
                    "error",
                    json!({ "core_id": target, "version": marker.version, "error": e.to_string() }),
                )
                .await;
                Err(SwitchError::Delegation {
                    core_id: target_id,
                    source: e,
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

    /// Monitor loop body.
    pub async fn run_loop(self: Arc<Self>, heartbeat: Heartbeat, cancel: CancellationToken) {
        info!(
            interval_seconds = self.settings.interval.as_secs(),
            components = self.probes.len(),
            "Starting system monitor loop"
        );
        let mut tick = tokio::time::interval(self.settings.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let summary = self.poll().await;
                    info!(overall_health = summary.overall_health, "System health polled");
                    heartbeat.beat();
                }
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, stopping system monitor loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_score() {
        assert_eq!(health_score(0, 0), 100.0);
        assert_eq!(health_score(3, 4), 75.0);
        assert_eq!(health_score(0, 2), 0.0);
    }
}
