// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub healthy: bool,
    /// Short reason when unhealthy (status code, connect error, timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProbeOutcome {
    pub fn healthy() -> Self {
        Self { healthy: true, reason: None }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self {
            healthy: false,
            reason: Some(reason.into()),
        }
    }
}

/// Reachability check for one monitored component. Implementations bound
/// their own duration and never return an error; failure is unhealthy.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}
