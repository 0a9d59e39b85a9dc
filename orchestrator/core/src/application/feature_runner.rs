// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Feature Validation Pipeline
//!
//! Unbounded FIFO of [`Feature`]s drained by exactly one worker, so at most
//! one feature environment exists at a time. For each feature:
//!
//! 1. Materialize a working directory holding the environment definition.
//! 2. Bring the environment up. On failure record a single
//!    `environment_up` error result and go straight to teardown.
//! 3. Wait the settle delay, then ask the oracle to judge each test.
//! 4. Tear the environment down, whatever happened in step 3.
//! 5. Persist one result per test plus the synthetic `overall` result.
//! 6. On overall success, send the feature and its results to the promotion
//!    endpoint of the currently designated core. A failed notification is
//!    logged and never changes the recorded results.
//!
//! A failing step aborts only the current feature, never the worker.

use crate::application::supervisor::Heartbeat;
use crate::domain::activity::ActivityRecord;
use crate::domain::core::{CoreClient, MarkerObservation, MarkerStore, PromotionRequest};
use crate::domain::error::OrchestratorError;
use crate::domain::feature::{Feature, TestResult, TestStatus, SETUP_TEST_NAME};
use crate::domain::judge::TestOracle;
use crate::domain::process::{EnvironmentDriver, ENVIRONMENT_FILE};
use crate::domain::repository::{ActivityRepository, TestResultRepository};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const ACTIVITY_SOURCE: &str = "feature_runner";

#[derive(Debug, Clone)]
pub struct FeatureRunnerSettings {
    pub work_dir: PathBuf,
    pub settle_delay: Duration,
    /// How long the idle worker waits before reporting a heartbeat.
    pub poll_interval: Duration,
    pub promotion_timeout: Duration,
    pub marker_staleness: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueReceipt {
    pub feature: String,
    pub version: String,
    pub queue_position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOutcome {
    NotAttempted,
    Accepted,
    Failed,
}

/// Everything one validation produced, in persistence order.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub feature: String,
    pub results: Vec<TestResult>,
    pub overall: Option<TestStatus>,
    pub promotion: PromotionOutcome,
    pub duration: f64,
}

pub struct FeatureRunner {
    settings: FeatureRunnerSettings,
    environment: Arc<dyn EnvironmentDriver>,
    oracle: Arc<dyn TestOracle>,
    results: Arc<dyn TestResultRepository>,
    activity: Arc<dyn ActivityRepository>,
    markers: Arc<dyn MarkerStore>,
    core_client: Arc<dyn CoreClient>,
    sender: mpsc::UnboundedSender<Feature>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Feature>>,
    queue_depth: AtomicUsize,
    current: Mutex<Option<String>>,
}

impl FeatureRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: FeatureRunnerSettings,
        environment: Arc<dyn EnvironmentDriver>,
        oracle: Arc<dyn TestOracle>,
        results: Arc<dyn TestResultRepository>,
        activity: Arc<dyn ActivityRepository>,
        markers: Arc<dyn MarkerStore>,
        core_client: Arc<dyn CoreClient>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            settings,
            environment,
            oracle,
            results,
            activity,
            markers,
            core_client,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            queue_depth: AtomicUsize::new(0),
            current: Mutex::new(None),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }

    /// Label of the feature being validated right now, if any.
    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Validate `config` and append it to the queue.
    pub fn enqueue(&self, config: &serde_json::Value) -> Result<EnqueueReceipt, OrchestratorError> {
        let feature = Feature::from_config(config)?;
        let receipt = EnqueueReceipt {
            feature: feature.name.clone(),
            version: feature.version.clone(),
            queue_position: self.queue_depth.fetch_add(1, Ordering::SeqCst) + 1,
        };
        if self.sender.send(feature).is_err() {
            self.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(OrchestratorError::Internal("feature queue is closed".to_string()));
        }
        info!(feature = %receipt.feature, position = receipt.queue_position, "Feature queued for validation");
        Ok(receipt)
    }

    pub async fn results(
        &self,
        feature_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TestResult>, OrchestratorError> {
        Ok(self.results.find(feature_name, limit).await?)
    }

    /// Run the full pipeline for one feature.
    pub async fn validate(&self, feature: Feature) -> ValidationOutcome {
        let label = feature.label();
        *self.current.lock() = Some(label.clone());
        let started = Instant::now();
        info!(feature = %label, "Validating feature");

        let dir = self.settings.work_dir.join(format!(
            "{}_{}_{}",
            feature.name,
            feature.version,
            &Uuid::new_v4().simple().to_string()[..8]
        ));

        let mut results = Vec::new();
        let mut environment_up = false;
        match self.materialize(&feature, &dir).await {
            Err(reason) => {
                results.push(self.setup_error(&feature, started, json!({ "error": reason }), ""));
            }
            Ok(()) => match self.environment.up(&dir).await {
                Ok(_) => environment_up = true,
                Err(e) => {
                    warn!(feature = %label, "Environment bring-up failed: {}", e);
                    results.push(self.setup_error(
                        &feature,
                        started,
                        json!({ "error": "environment bring-up failed" }),
                        e.to_string(),
                    ));
                }
            },
        }

        if environment_up {
            tokio::time::sleep(self.settings.settle_delay).await;
            for test in feature.effective_tests() {
                let test_started = Instant::now();
                let verdict = self.oracle.judge(&feature, &test).await;
                info!(feature = %label, test = %test.name, status = %verdict.status, "Test judged");
                results.push(TestResult::for_feature(
                    &feature,
                    test.name.clone(),
                    verdict.status,
                    test_started.elapsed().as_secs_f64(),
                    json!({ "details": verdict.details, "prompt": test.prompt }),
                    verdict.raw,
                ));
            }
        }

        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            // also attempted when bring-up failed, to release partial resources
            if let Err(e) = self.environment.down(&dir).await {
                warn!(feature = %label, "Environment teardown failed: {}", e);
            }
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                warn!(feature = %label, "Failed to remove working directory: {}", e);
            }
        }

        let duration = started.elapsed().as_secs_f64();
        let overall = if environment_up {
            let overall = TestResult::overall(&feature, &results, duration);
            let status = overall.status;
            results.push(overall);
            Some(status)
        } else {
            None
        };

        for result in &results {
            if let Err(e) = self.results.save(result).await {
                error!(feature = %label, test = %result.test_name, "Failed to persist test result: {}", e);
            }
        }

        let promotion = if overall == Some(TestStatus::Success) {
            self.notify_active_core(&feature, &results).await
        } else {
            PromotionOutcome::NotAttempted
        };

        let status = overall.map(|s| s.as_str()).unwrap_or("error");
        metrics::counter!("duplex_feature_validations_total", "status" => status).increment(1);
        self.record(
            "validation",
            "validate_feature",
            status,
            json!({ "feature": label, "duration": duration, "tests": results.len(), "promotion": promotion }),
        )
        .await;
        info!(feature = %label, status, duration, "Feature validation finished");
        *self.current.lock() = None;

        ValidationOutcome {
            feature: label,
            results,
            overall,
            promotion,
            duration,
        }
    }

    async fn materialize(&self, feature: &Feature, dir: &Path) -> Result<(), String> {
        let definition = serde_yaml::to_string(&feature.environment).map_err(|e| e.to_string())?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| e.to_string())?;
        tokio::fs::write(dir.join(ENVIRONMENT_FILE), definition)
            .await
            .map_err(|e| e.to_string())
    }

    fn setup_error(
        &self,
        feature: &Feature,
        started: Instant,
        details: serde_json::Value,
        logs: impl Into<String>,
    ) -> TestResult {
        TestResult::for_feature(
            feature,
            SETUP_TEST_NAME,
            TestStatus::Error,
            started.elapsed().as_secs_f64(),
            details,
            logs,
        )
    }

    async fn notify_active_core(&self, feature: &Feature, results: &[TestResult]) -> PromotionOutcome {
        let label = feature.label();
        let marker = match self.markers.read().await {
            Ok(marker) => MarkerObservation::classify(marker.as_ref(), Utc::now(), self.settings.marker_staleness),
            Err(e) => MarkerObservation::Unknown { reason: e.to_string() },
        };
        let core_id = match marker {
            MarkerObservation::Designated { core_id, .. } => core_id,
            MarkerObservation::Unknown { reason } => {
                warn!(feature = %label, "No active core to promote to: {}", reason);
                return PromotionOutcome::Failed;
            }
        };

        let request = PromotionRequest {
            feature: feature.clone(),
            test_results: results.to_vec(),
        };
        let sent = tokio::time::timeout(
            self.settings.promotion_timeout,
            self.core_client.promote(&core_id, &request),
        )
        .await;
        match sent {
            Ok(Ok(())) => {
                info!(feature = %label, core_id = %core_id, "Promotion accepted");
                PromotionOutcome::Accepted
            }
            Ok(Err(e)) => {
                warn!(feature = %label, core_id = %core_id, "Promotion failed: {}", e);
                PromotionOutcome::Failed
            }
            Err(_) => {
                warn!(feature = %label, core_id = %core_id, "Promotion timed out");
                PromotionOutcome::Failed
            }
        }
    }

    async fn record(&self, log_type: &str, action: &str, status: &str, details: serde_json::Value) {
        let record = ActivityRecord::new(ACTIVITY_SOURCE, log_type, action, status, details);
        if let Err(e) = self.activity.append(&record).await {
            warn!("Failed to write activity log: {}", e);
        }
    }

    /// Worker loop body. Holds the queue receiver for its lifetime, so there
    /// is never more than one consumer.
    pub async fn run_worker(self: Arc<Self>, heartbeat: Heartbeat, cancel: CancellationToken) {
        let mut receiver = self.receiver.lock().await;
        info!(queued = self.queue_depth(), "Feature worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, stopping feature worker");
                    break;
                }
                next = tokio::time::timeout(self.settings.poll_interval, receiver.recv()) => match next {
                    Err(_) => heartbeat.beat(),
                    Ok(Some(feature)) => {
                        self.queue_depth.fetch_sub(1, Ordering::SeqCst);
                        self.validate(feature).await;
                        heartbeat.beat();
                    }
                    Ok(None) => break,
                },
            }
        }
    }
}
