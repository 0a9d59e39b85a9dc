// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the relational audit store, one per record type,
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `CommandRepository` | `CommandRecord` | `InMemoryCommandRepository`, `PostgresCommandRepository` |
//! | `ActivityRepository` | `ActivityRecord` | `InMemoryActivityRepository`, `PostgresActivityRepository` |
//! | `ComponentRepository` | `ComponentVersion` | `InMemoryComponentRepository`, `PostgresComponentRepository` |
//! | `TestResultRepository` | `TestResult` | `InMemoryTestResultRepository`, `PostgresTestResultRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at process startup from `spec.database` in
//! `duplex-config.yaml`: in-memory when no URL is configured, PostgreSQL
//! otherwise. Every store is append-only or supersede-only; nothing deletes.

use crate::domain::activity::ActivityRecord;
use crate::domain::command::{CommandId, CommandRecord, CommandStatus};
use crate::domain::component::{ComponentStatus, ComponentVersion};
use crate::domain::core::CoreId;
use crate::domain::feature::TestResult;
use async_trait::async_trait;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Append-only command audit trail.
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Insert a pending record before execution.
    async fn insert(&self, record: &CommandRecord) -> Result<(), RepositoryError>;

    /// Set the terminal status. Fails with `Conflict` if the record already
    /// left `pending`.
    async fn complete(
        &self,
        id: CommandId,
        status: CommandStatus,
        payload: &serde_json::Value,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: CommandId) -> Result<Option<CommandRecord>, RepositoryError>;

    /// Newest first.
    async fn find_recent(&self, limit: usize) -> Result<Vec<CommandRecord>, RepositoryError>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn append(&self, record: &ActivityRecord) -> Result<(), RepositoryError>;

    /// Newest first; `source` filters by emitting component.
    async fn find_recent(
        &self,
        source: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, RepositoryError>;
}

#[async_trait]
pub trait ComponentRepository: Send + Sync {
    /// Store `version` as active and mark any previously active version of
    /// the same component deprecated.
    async fn register(&self, version: &ComponentVersion) -> Result<(), RepositoryError>;

    async fn list_by_core(&self, core: &CoreId) -> Result<Vec<ComponentVersion>, RepositoryError>;

    async fn set_status(
        &self,
        component_name: &str,
        version: &str,
        status: ComponentStatus,
    ) -> Result<ComponentVersion, RepositoryError>;
}

#[async_trait]
pub trait TestResultRepository: Send + Sync {
    async fn save(&self, result: &TestResult) -> Result<(), RepositoryError>;

    /// Newest first, optionally filtered by component name.
    async fn find(
        &self,
        feature_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TestResult>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
