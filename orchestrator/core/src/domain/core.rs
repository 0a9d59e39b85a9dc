// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Core Identity, Role and Designation
//!
//! A deployment runs two Core Manager processes. Each owns one [`CoreState`]
//! and decides its own role by comparing itself to the externally written
//! [`ActiveCoreMarker`].
//!
//! ## Marker freshness
//!
//! The marker is a versioned record with a single writer (the System
//! Monitor). The writer re-asserts it every cycle; a reader that sees a
//! marker older than the configured staleness bound classifies it as
//! [`MarkerObservation::Unknown`] and must not infer a role from it.

use crate::domain::feature::{Feature, TestResult};
use crate::domain::service::ServiceStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreId(pub String);

impl CoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreRole {
    Active,
    Standby,
}

impl fmt::Display for CoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreRole::Active => f.write_str("ACTIVE"),
            CoreRole::Standby => f.write_str("STANDBY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreStatus {
    Initializing,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCoreMarker {
    pub core_id: CoreId,
    /// Bumped on every change of designated core, never on refresh.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarkerObservation {
    Designated { core_id: CoreId, version: u64 },
    Unknown { reason: String },
}

impl MarkerObservation {
    pub fn classify(
        marker: Option<&ActiveCoreMarker>,
        now: DateTime<Utc>,
        staleness: Duration,
    ) -> Self {
        let Some(marker) = marker else {
            return MarkerObservation::Unknown {
                reason: "no active core marker has been written".to_string(),
            };
        };

        let age = now.signed_duration_since(marker.updated_at);
        let bound = chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::MAX);
        if age > bound {
            return MarkerObservation::Unknown {
                reason: format!(
                    "marker v{} is {}s old (bound {}s)",
                    marker.version,
                    age.num_seconds(),
                    staleness.as_secs()
                ),
            };
        }

        MarkerObservation::Designated {
            core_id: marker.core_id.clone(),
            version: marker.version,
        }
    }

    /// Role this core should hold, or `None` when the designation is unknown.
    pub fn desired_role(&self, me: &CoreId) -> Option<CoreRole> {
        match self {
            MarkerObservation::Designated { core_id, .. } if core_id == me => Some(CoreRole::Active),
            MarkerObservation::Designated { .. } => Some(CoreRole::Standby),
            MarkerObservation::Unknown { .. } => None,
        }
    }
}

/// Per-core state, mutated only by the owning core's loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreState {
    pub core_id: CoreId,
    pub role: CoreRole,
    pub last_health_check: Option<DateTime<Utc>>,
    pub status: CoreStatus,
    pub services: BTreeMap<String, ServiceStatus>,
    pub marker: MarkerObservation,
}

impl CoreState {
    pub fn new(core_id: CoreId, initial_role: CoreRole) -> Self {
        Self {
            core_id,
            role: initial_role,
            last_health_check: None,
            status: CoreStatus::Initializing,
            services: BTreeMap::new(),
            marker: MarkerObservation::Unknown {
                reason: "not yet observed".to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Shared state I/O error: {0}")]
    Io(String),
    #[error("Shared state is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Shared, consistent location for the active core designation.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn read(&self) -> Result<Option<ActiveCoreMarker>, StoreError>;

    /// Designate `core_id`. Returns the resulting marker and whether the
    /// designated core changed (version bumped).
    async fn designate(&self, core_id: &CoreId) -> Result<(ActiveCoreMarker, bool), StoreError>;
}

/// Location both cores can read each other's aggregate state from.
#[async_trait]
pub trait CoreStatusStore: Send + Sync {
    async fn publish(&self, state: &CoreState) -> Result<(), StoreError>;
    async fn load(&self, core_id: &CoreId) -> Result<Option<CoreState>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub feature: Feature,
    pub test_results: Vec<TestResult>,
}

#[derive(Debug, Error)]
pub enum CoreClientError {
    #[error("Unknown core: {0}")]
    UnknownCore(CoreId),
    #[error("Core request failed: {0}")]
    Transport(String),
    #[error("Core rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound calls other components make to a Core Manager.
#[async_trait]
pub trait CoreClient: Send + Sync {
    /// Ask the core to run a health-and-role cycle now.
    async fn reconcile(&self, core_id: &CoreId) -> Result<(), CoreClientError>;

    async fn promote(&self, core_id: &CoreId, request: &PromotionRequest) -> Result<(), CoreClientError>;
}
