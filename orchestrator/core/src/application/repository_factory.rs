// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete audit-store repositories based on the storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select InMemory or Postgres repositories at boot

use std::sync::Arc;
use sqlx::PgPool;

use crate::domain::repository::{
    ActivityRepository, CommandRepository, ComponentRepository, StorageBackend,
    TestResultRepository,
};
use crate::infrastructure::repositories::{
    InMemoryActivityRepository, InMemoryCommandRepository, InMemoryComponentRepository,
    InMemoryTestResultRepository, PostgresActivityRepository, PostgresCommandRepository,
    PostgresComponentRepository, PostgresTestResultRepository,
};

/// Every audit repository a component may need, built from one backend.
#[derive(Clone)]
pub struct Repositories {
    pub commands: Arc<dyn CommandRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub components: Arc<dyn ComponentRepository>,
    pub test_results: Arc<dyn TestResultRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            commands: Arc::new(InMemoryCommandRepository::new()),
            activity: Arc::new(InMemoryActivityRepository::new()),
            components: Arc::new(InMemoryComponentRepository::new()),
            test_results: Arc::new(InMemoryTestResultRepository::new()),
        }
    }

    /// Falls back to in-memory when the backend is Postgres but no pool
    /// could be created.
    pub fn create(backend: &StorageBackend, pool: Option<PgPool>) -> Self {
        match (backend, pool) {
            (StorageBackend::PostgreSQL(_), Some(pool)) => Self {
                commands: create_command_repository(backend, Some(pool.clone())),
                activity: create_activity_repository(backend, Some(pool.clone())),
                components: create_component_repository(backend, Some(pool.clone())),
                test_results: create_test_result_repository(backend, Some(pool)),
            },
            _ => Self::in_memory(),
        }
    }
}

/// Creates a CommandRepository implementation based on the configured backend
pub fn create_command_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn CommandRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresCommandRepository::new(pool)),
        _ => Arc::new(InMemoryCommandRepository::new()),
    }
}

/// Creates an ActivityRepository implementation based on the configured backend
pub fn create_activity_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn ActivityRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresActivityRepository::new(pool)),
        _ => Arc::new(InMemoryActivityRepository::new()),
    }
}

/// Creates a ComponentRepository implementation based on the configured backend
pub fn create_component_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn ComponentRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresComponentRepository::new(pool)),
        _ => Arc::new(InMemoryComponentRepository::new()),
    }
}

/// Creates a TestResultRepository implementation based on the configured backend
pub fn create_test_result_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn TestResultRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresTestResultRepository::new(pool)),
        _ => Arc::new(InMemoryTestResultRepository::new()),
    }
}
