// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Core Manager
//!
//! One per core process. Owns the core's [`CoreState`], runs the periodic
//! health-and-role cycle and hosts the [`CommandDispatcher`].
//!
//! ## Health cycle
//!
//! 1. List the containers in this core's scope and refresh service history.
//! 2. Read the shared active-core marker and classify it.
//! 3. If the marker designates a different role than the current one,
//!    perform the side effect (ACTIVE: start scoped services; STANDBY: stop
//!    all scoped services except this process's own container). The role
//!    only changes once the side effect succeeded, so a failed attempt is
//!    retried by the next cycle.
//! 4. Publish the aggregate state to the shared directory.
//!
//! An `Unknown` marker (missing, unreadable, stale) leaves the role as is.

use crate::application::dispatcher::CommandDispatcher;
use crate::application::supervisor::Heartbeat;
use crate::domain::activity::ActivityRecord;
use crate::domain::component::{ComponentStatus, ComponentVersion};
use crate::domain::core::{
    CoreId, CoreRole, CoreState, CoreStatus, CoreStatusStore, MarkerObservation, MarkerStore,
    PromotionRequest,
};
use crate::domain::error::OrchestratorError;
use crate::domain::feature::{TestStatus, OVERALL_TEST_NAME};
use crate::domain::repository::{ActivityRepository, ComponentRepository};
use crate::domain::runtime::{ContainerInfo, ContainerRuntime};
use crate::domain::service::{ServiceHistory, ServiceStatus};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct CoreManagerSettings {
    pub core_id: CoreId,
    /// Containers whose name contains this string belong to the core.
    pub container_scope: String,
    /// The Core Manager's own container; never stopped on STANDBY.
    pub self_container: String,
    pub health_interval: Duration,
    pub marker_staleness: Duration,
    pub history_length: usize,
    pub stop_grace: Duration,
}

/// Summary of one health-and-role cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub role: CoreRole,
    pub transitioned: bool,
    pub marker: MarkerObservation,
    pub services: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_error: Option<String>,
}

pub struct CoreManager {
    settings: CoreManagerSettings,
    runtime: Arc<dyn ContainerRuntime>,
    markers: Arc<dyn MarkerStore>,
    status_store: Arc<dyn CoreStatusStore>,
    activity: Arc<dyn ActivityRepository>,
    components: Arc<dyn ComponentRepository>,
    dispatcher: Arc<CommandDispatcher>,
    state: RwLock<CoreState>,
    history: Mutex<ServiceHistory>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl CoreManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: CoreManagerSettings,
        runtime: Arc<dyn ContainerRuntime>,
        markers: Arc<dyn MarkerStore>,
        status_store: Arc<dyn CoreStatusStore>,
        activity: Arc<dyn ActivityRepository>,
        components: Arc<dyn ComponentRepository>,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Self {
        let state = CoreState::new(settings.core_id.clone(), CoreRole::Standby);
        let history = ServiceHistory::new(settings.history_length);
        Self {
            settings,
            runtime,
            markers,
            status_store,
            activity,
            components,
            dispatcher,
            state: RwLock::new(state),
            history: Mutex::new(history),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn core_id(&self) -> &CoreId {
        &self.settings.core_id
    }

    pub fn state(&self) -> CoreState {
        self.state.read().clone()
    }

    pub fn role(&self) -> CoreRole {
        self.state.read().role
    }

    pub fn health_interval(&self) -> Duration {
        self.settings.health_interval
    }

    pub fn marker_staleness(&self) -> Duration {
        self.settings.marker_staleness
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn service_history(&self, name: &str) -> Vec<ServiceStatus> {
        self.history.lock().history_of(name)
    }

    fn activity_source(&self) -> String {
        format!("core-{}", self.settings.core_id)
    }

    fn in_scope(&self, container: &ContainerInfo) -> bool {
        container.name.contains(&self.settings.container_scope)
    }

    /// Resume the role this core last published, so a restarted process
    /// does not flap its services before the first cycle.
    pub async fn restore_state(&self) {
        match self.status_store.load(&self.settings.core_id).await {
            Ok(Some(previous)) => {
                info!(core_id = %self.settings.core_id, role = %previous.role, "Restored previous core role");
                self.state.write().role = previous.role;
            }
            Ok(None) => {}
            Err(e) => warn!(core_id = %self.settings.core_id, "Could not load previous core state: {}", e),
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, OrchestratorError> {
        let _guard = self.cycle_lock.lock().await;
        let core_id = self.settings.core_id.clone();

        let containers = match self.runtime.list(true).await {
            Ok(containers) => containers,
            Err(e) => {
                self.state.write().status = CoreStatus::Error;
                self.publish().await;
                return Err(e.into());
            }
        };
        let scoped: Vec<ContainerInfo> = containers.into_iter().filter(|c| self.in_scope(c)).collect();

        let now = Utc::now();
        let latest = {
            let mut history = self.history.lock();
            history.record(scoped.iter().map(|c| ServiceStatus::from_container(c, now)).collect());
            history.latest().clone()
        };

        let marker = match self.markers.read().await {
            Ok(marker) => MarkerObservation::classify(marker.as_ref(), now, self.settings.marker_staleness),
            Err(e) => MarkerObservation::Unknown {
                reason: format!("marker unreadable: {}", e),
            },
        };
        if let MarkerObservation::Unknown { reason } = &marker {
            warn!(core_id = %core_id, "Active core designation unknown, keeping current role: {}", reason);
        }

        let current = {
            let mut state = self.state.write();
            state.services = latest;
            state.last_health_check = Some(now);
            state.marker = marker.clone();
            state.role
        };

        let mut transitioned = false;
        let mut transition_error = None;
        if let Some(desired) = marker.desired_role(&core_id) {
            if desired != current {
                match self.transition(desired, &scoped).await {
                    Ok(()) => transitioned = true,
                    Err(e) => transition_error = Some(e.to_string()),
                }
            }
        }

        let (role, services) = {
            let mut state = self.state.write();
            state.status = if transition_error.is_some() {
                CoreStatus::Error
            } else {
                CoreStatus::Running
            };
            (state.role, state.services.len())
        };
        self.publish().await;
        debug!(core_id = %core_id, role = %role, services, "Health cycle complete");

        Ok(CycleReport {
            role,
            transitioned,
            marker,
            services,
            transition_error,
        })
    }

    async fn transition(&self, target: CoreRole, scoped: &[ContainerInfo]) -> Result<(), OrchestratorError> {
        let core_id = &self.settings.core_id;
        info!(core_id = %core_id, target = %target, "Transitioning core role");

        let mut failures = Vec::new();
        match target {
            CoreRole::Active => {
                for container in scoped.iter().filter(|c| !c.is_running()) {
                    if let Err(e) = self.runtime.start(&container.name).await {
                        failures.push(format!("{}: {}", container.name, e));
                    }
                }
            }
            CoreRole::Standby => {
                for container in scoped
                    .iter()
                    .filter(|c| c.is_running() && c.name != self.settings.self_container)
                {
                    if let Err(e) = self.runtime.stop(&container.name, self.settings.stop_grace).await {
                        if !e.is_not_found() {
                            failures.push(format!("{}: {}", container.name, e));
                        }
                    }
                }
            }
        }

        let action = match target {
            CoreRole::Active => "activate",
            CoreRole::Standby => "deactivate",
        };
        if failures.is_empty() {
            self.state.write().role = target;
            self.record(
                "role_transition",
                action,
                "success",
                json!({ "role": target, "services": scoped.len() }),
            )
            .await;
            info!(core_id = %core_id, role = %target, "Core role changed");
            Ok(())
        } else {
            self.record(
                "role_transition",
                action,
                "error",
                json!({ "role": target, "failures": failures }),
            )
            .await;
            error!(core_id = %core_id, target = %target, "Role transition failed: {}", failures.join("; "));
            Err(OrchestratorError::DependencyUnavailable {
                dependency: "container runtime",
                reason: failures.join("; "),
            })
        }
    }

    async fn publish(&self) {
        let state = self.state();
        if let Err(e) = self.status_store.publish(&state).await {
            warn!(core_id = %self.settings.core_id, "Failed to publish core state: {}", e);
        }
    }

    async fn record(&self, log_type: &str, action: &str, status: &str, details: serde_json::Value) {
        let record = ActivityRecord::new(self.activity_source(), log_type, action, status, details);
        if let Err(e) = self.activity.append(&record).await {
            warn!(core_id = %self.settings.core_id, "Failed to write activity log: {}", e);
        }
    }

    /// Register a validated feature as the active version of its component.
    pub async fn promote(&self, request: PromotionRequest) -> Result<ComponentVersion, OrchestratorError> {
        let role = self.role();
        if role != CoreRole::Active {
            self.record(
                "promotion",
                "deploy",
                "rejected",
                json!({ "feature": request.feature.label(), "role": role }),
            )
            .await;
            return Err(OrchestratorError::Conflict(format!(
                "core {} is {}; promotions are accepted only by the active core",
                self.settings.core_id, role
            )));
        }

        request.feature.validate()?;
        if let Some(overall) = request
            .test_results
            .iter()
            .find(|r| r.test_name == OVERALL_TEST_NAME)
        {
            if overall.status != TestStatus::Success {
                return Err(OrchestratorError::Validation(format!(
                    "{} did not pass validation (overall: {})",
                    request.feature.label(),
                    overall.status
                )));
            }
        }

        let version = ComponentVersion::active(
            request.feature.name.clone(),
            request.feature.version.clone(),
            self.settings.core_id.clone(),
            json!({
                "component_type": request.feature.component_type,
                "tests": request.test_results.len(),
                "environment": request.feature.environment,
            }),
        );
        self.components.register(&version).await?;
        self.record(
            "promotion",
            "deploy",
            "success",
            json!({ "component": version.component_name, "version": version.version }),
        )
        .await;
        info!(
            core_id = %self.settings.core_id,
            component = %version.component_name,
            version = %version.version,
            "Component version promoted"
        );
        Ok(version)
    }

    pub async fn components(&self) -> Result<Vec<ComponentVersion>, OrchestratorError> {
        Ok(self.components.list_by_core(&self.settings.core_id).await?)
    }

    /// Mark a version `failed` or `deprecated`. Versions are never deleted
    /// and cannot be reactivated here; re-promotion does that.
    pub async fn set_component_status(
        &self,
        component_name: &str,
        version: &str,
        status: ComponentStatus,
    ) -> Result<ComponentVersion, OrchestratorError> {
        if status == ComponentStatus::Active {
            return Err(OrchestratorError::Validation(
                "status must be 'failed' or 'deprecated'".to_string(),
            ));
        }
        let updated = self.components.set_status(component_name, version, status).await?;
        self.record(
            "component",
            "set_status",
            "success",
            json!({ "component": component_name, "version": version, "status": status }),
        )
        .await;
        Ok(updated)
    }

    pub async fn activity_log(&self, limit: usize) -> Result<Vec<ActivityRecord>, OrchestratorError> {
        Ok(self
            .activity
            .find_recent(Some(&self.activity_source()), limit)
            .await?)
    }

    /// Health loop body; run under the loop supervisor.
    pub async fn run_loop(self: Arc<Self>, heartbeat: Heartbeat, cancel: CancellationToken) {
        info!(
            core_id = %self.settings.core_id,
            interval_seconds = self.settings.health_interval.as_secs(),
            staleness_seconds = self.settings.marker_staleness.as_secs(),
            "Starting core health loop"
        );
        let mut tick = tokio::time::interval(self.settings.health_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(core_id = %self.settings.core_id, "Health cycle failed: {}", e);
                    }
                    heartbeat.beat();
                }
                _ = cancel.cancelled() => {
                    info!(core_id = %self.settings.core_id, "Shutdown signal received, stopping core health loop");
                    break;
                }
            }
        }
    }
}
