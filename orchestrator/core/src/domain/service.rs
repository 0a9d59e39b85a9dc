// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::ContainerInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub running_state: String,
    pub image_reference: String,
    pub health_indicator: String,
    pub timestamp: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn from_container(info: &ContainerInfo, observed_at: DateTime<Utc>) -> Self {
        Self {
            name: info.name.clone(),
            running_state: info.state.clone(),
            image_reference: info.image.clone(),
            health_indicator: info.health.clone(),
            timestamp: observed_at,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_state == "running"
    }
}

/// Point-in-time view of every service. Never mutated once archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceStatus>,
}

impl SystemSnapshot {
    pub fn capture(containers: &[ContainerInfo], at: DateTime<Utc>) -> Self {
        let services = containers
            .iter()
            .map(|c| (c.name.clone(), ServiceStatus::from_container(c, at)))
            .collect();
        Self { timestamp: at, services }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.get(name)
    }
}

/// Latest status per service plus a bounded rolling history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHistory {
    capacity: usize,
    latest: BTreeMap<String, ServiceStatus>,
    history: BTreeMap<String, VecDeque<ServiceStatus>>,
}

impl ServiceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            latest: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }

    /// Replace the latest view with `statuses`; services that vanished drop
    /// out of `latest` but keep their history.
    pub fn record(&mut self, statuses: Vec<ServiceStatus>) {
        self.latest.clear();
        for status in statuses {
            let entry = self.history.entry(status.name.clone()).or_default();
            entry.push_back(status.clone());
            while entry.len() > self.capacity {
                entry.pop_front();
            }
            self.latest.insert(status.name.clone(), status);
        }
    }

    pub fn latest(&self) -> &BTreeMap<String, ServiceStatus> {
        &self.latest
    }

    pub fn history_of(&self, name: &str) -> Vec<ServiceStatus> {
        self.history
            .get(name)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, state: &str) -> ServiceStatus {
        ServiceStatus {
            name: name.to_string(),
            running_state: state.to_string(),
            image_reference: "img:latest".to_string(),
            health_indicator: "unknown".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_history_is_bounded_and_latest_replaced() {
        let mut history = ServiceHistory::new(2);
        history.record(vec![status("a", "running"), status("b", "running")]);
        history.record(vec![status("a", "exited")]);
        history.record(vec![status("a", "running")]);

        assert_eq!(history.latest().len(), 1);
        assert!(history.latest()["a"].is_running());

        let a = history.history_of("a");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].running_state, "exited");
        assert_eq!(history.history_of("b").len(), 1);
    }

    #[test]
    fn test_snapshot_capture_keys_by_name() {
        let containers = vec![ContainerInfo {
            id: "abc".to_string(),
            name: "ollama".to_string(),
            state: "running".to_string(),
            image: "ollama/ollama:latest".to_string(),
            health: "healthy".to_string(),
        }];
        let snapshot = SystemSnapshot::capture(&containers, Utc::now());
        assert_eq!(snapshot.get("ollama").map(|s| s.is_running()), Some(true));
    }
}
