// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into every PostgreSQL repository implementation. Only created
//! when `spec.database` is configured in `duplex-config.yaml`.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Audit schema, created idempotently at boot.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS command_history (
        id UUID PRIMARY KEY,
        core_id TEXT NOT NULL,
        command_type TEXT NOT NULL,
        command TEXT NOT NULL,
        parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
        result_status TEXT NOT NULL,
        result JSONB,
        timestamp TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS command_history_timestamp_idx ON command_history (timestamp DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS activity_logs (
        id UUID PRIMARY KEY,
        source TEXT NOT NULL,
        log_type TEXT NOT NULL,
        action TEXT NOT NULL,
        status TEXT NOT NULL,
        details JSONB NOT NULL DEFAULT '{}'::jsonb,
        timestamp TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS activity_logs_timestamp_idx ON activity_logs (timestamp DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS component_versions (
        id UUID PRIMARY KEY,
        component_name TEXT NOT NULL,
        version TEXT NOT NULL,
        status TEXT NOT NULL,
        core_id TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (component_name, version)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS test_results (
        id BIGSERIAL PRIMARY KEY,
        component_name TEXT NOT NULL,
        test_name TEXT NOT NULL,
        version TEXT NOT NULL,
        status TEXT NOT NULL,
        duration DOUBLE PRECISION NOT NULL,
        details JSONB NOT NULL DEFAULT '{}'::jsonb,
        logs TEXT NOT NULL DEFAULT '',
        timestamp TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS test_results_component_idx ON test_results (component_name, timestamp DESC)"#,
];

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    /// Create the audit tables if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Audit schema ready");
        Ok(())
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
