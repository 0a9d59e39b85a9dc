// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the audit-store repositories defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve audit records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! Backed by the tables created in [`crate::infrastructure::db::Database::migrate`]:
//! - **PostgresCommandRepository** - `command_history`
//! - **PostgresActivityRepository** - `activity_logs`
//! - **PostgresComponentRepository** - `component_versions`
//! - **PostgresTestResultRepository** - `test_results`
//!
//! ## In-Memory Repositories
//!
//! Lock-guarded, process-local implementations for development and tests.

pub mod postgres;

pub use postgres::{
    PostgresActivityRepository, PostgresCommandRepository, PostgresComponentRepository,
    PostgresTestResultRepository,
};

use crate::domain::activity::ActivityRecord;
use crate::domain::command::{CommandId, CommandRecord, CommandStatus};
use crate::domain::component::{ComponentStatus, ComponentVersion};
use crate::domain::core::CoreId;
use crate::domain::feature::TestResult;
use crate::domain::repository::{
    ActivityRepository, CommandRepository, ComponentRepository, RepositoryError,
    TestResultRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryCommandRepository {
    records: Arc<RwLock<Vec<CommandRecord>>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn insert(&self, record: &CommandRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.id == record.id) {
            return Err(RepositoryError::Conflict(format!("command {} already recorded", record.id)));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn complete(
        &self,
        id: CommandId,
        status: CommandStatus,
        payload: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("command {}", id)))?;
        if record.result_status != CommandStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "command {} already completed as {}",
                id,
                record.result_status.as_str()
            )));
        }
        record.result_status = status;
        record.result_payload = Some(payload.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: CommandId) -> Result<Option<CommandRecord>, RepositoryError> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<CommandRecord>, RepositoryError> {
        Ok(self.records.read().iter().rev().take(limit).cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryActivityRepository {
    records: Arc<RwLock<Vec<ActivityRecord>>>,
}

impl InMemoryActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityRepository for InMemoryActivityRepository {
    async fn append(&self, record: &ActivityRecord) -> Result<(), RepositoryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn find_recent(
        &self,
        source: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| source.map_or(true, |s| r.source == s))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryComponentRepository {
    versions: Arc<RwLock<Vec<ComponentVersion>>>,
}

impl InMemoryComponentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComponentRepository for InMemoryComponentRepository {
    async fn register(&self, version: &ComponentVersion) -> Result<(), RepositoryError> {
        let mut versions = self.versions.write();
        let now = Utc::now();
        for existing in versions.iter_mut() {
            if existing.component_name == version.component_name
                && existing.status == ComponentStatus::Active
                && existing.version != version.version
            {
                existing.status = ComponentStatus::Deprecated;
                existing.updated_at = now;
            }
        }
        match versions.iter_mut().find(|v| {
            v.component_name == version.component_name && v.version == version.version
        }) {
            // re-promotion of a known version reactivates it
            Some(existing) => {
                existing.status = ComponentStatus::Active;
                existing.registering_core = version.registering_core.clone();
                existing.metadata = version.metadata.clone();
                existing.updated_at = now;
            }
            None => versions.push(version.clone()),
        }
        Ok(())
    }

    async fn list_by_core(&self, core: &CoreId) -> Result<Vec<ComponentVersion>, RepositoryError> {
        let mut list: Vec<_> = self
            .versions
            .read()
            .iter()
            .filter(|v| &v.registering_core == core)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(list)
    }

    async fn set_status(
        &self,
        component_name: &str,
        version: &str,
        status: ComponentStatus,
    ) -> Result<ComponentVersion, RepositoryError> {
        let mut versions = self.versions.write();
        let existing = versions
            .iter_mut()
            .find(|v| v.component_name == component_name && v.version == version)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("component {} version {}", component_name, version))
            })?;
        existing.status = status;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTestResultRepository {
    results: Arc<RwLock<Vec<TestResult>>>,
}

impl InMemoryTestResultRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestResultRepository for InMemoryTestResultRepository {
    async fn save(&self, result: &TestResult) -> Result<(), RepositoryError> {
        self.results.write().push(result.clone());
        Ok(())
    }

    async fn find(
        &self,
        feature_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TestResult>, RepositoryError> {
        Ok(self
            .results
            .read()
            .iter()
            .rev()
            .filter(|r| feature_name.map_or(true, |n| r.component_name == n))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_command_completes_exactly_once() {
        let repo = InMemoryCommandRepository::new();
        let record = CommandRecord::pending(CoreId::new("1"), "shell", "ls", json!({}));
        repo.insert(&record).await.unwrap();

        repo.complete(record.id, CommandStatus::Success, &json!({"stdout": ""}))
            .await
            .unwrap();
        let second = repo.complete(record.id, CommandStatus::Error, &json!({})).await;
        assert!(matches!(second, Err(RepositoryError::Conflict(_))));

        let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.result_status, CommandStatus::Success);
    }

    #[tokio::test]
    async fn test_register_deprecates_previous_active() {
        let repo = InMemoryComponentRepository::new();
        let core = CoreId::new("1");
        repo.register(&ComponentVersion::active("echo", "1.0", core.clone(), json!({})))
            .await
            .unwrap();
        repo.register(&ComponentVersion::active("echo", "1.1", core.clone(), json!({})))
            .await
            .unwrap();

        let versions = repo.list_by_core(&core).await.unwrap();
        assert_eq!(versions.len(), 2);
        let status_of = |v: &str| versions.iter().find(|c| c.version == v).unwrap().status;
        assert_eq!(status_of("1.0"), ComponentStatus::Deprecated);
        assert_eq!(status_of("1.1"), ComponentStatus::Active);
    }

    #[tokio::test]
    async fn test_results_newest_first_with_filter() {
        let repo = InMemoryTestResultRepository::new();
        for (component, test) in [("a", "t1"), ("b", "t2"), ("a", "t3")] {
            repo.save(&TestResult {
                component_name: component.to_string(),
                test_name: test.to_string(),
                version: "1".to_string(),
                status: crate::domain::feature::TestStatus::Success,
                duration: 0.1,
                details: json!({}),
                logs: String::new(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
        let results = repo.find(Some("a"), 10).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.test_name.as_str()).collect();
        assert_eq!(names, vec!["t3", "t1"]);
        assert_eq!(repo.find(None, 1).await.unwrap().len(), 1);
    }
}
