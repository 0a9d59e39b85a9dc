// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::core::CoreId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Active,
    Deprecated,
    Failed,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Active => "active",
            ComponentStatus::Deprecated => "deprecated",
            ComponentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ComponentStatus::Active),
            "deprecated" => Some(ComponentStatus::Deprecated),
            "failed" => Some(ComponentStatus::Failed),
            _ => None,
        }
    }
}

/// Promoted component version. Superseded versions are marked, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVersion {
    pub id: Uuid,
    pub component_name: String,
    pub version: String,
    pub status: ComponentStatus,
    pub registering_core: CoreId,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentVersion {
    pub fn active(
        component_name: impl Into<String>,
        version: impl Into<String>,
        registering_core: CoreId,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            component_name: component_name.into(),
            version: version.into(),
            status: ComponentStatus::Active,
            registering_core,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}
