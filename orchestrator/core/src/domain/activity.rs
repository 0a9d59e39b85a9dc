// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// System event: role transitions, promotions, switch requests, recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    /// Emitting component, e.g. `core-1` or `system_monitor`.
    pub source: String,
    pub log_type: String,
    pub action: String,
    pub status: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        source: impl Into<String>,
        log_type: impl Into<String>,
        action: impl Into<String>,
        status: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            log_type: log_type.into(),
            action: action.into(),
            status: status.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}
