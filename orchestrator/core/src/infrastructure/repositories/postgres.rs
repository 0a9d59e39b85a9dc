// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres audit repositories
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** PostgreSQL-backed command history, activity log,
//!   component registry and test results

use crate::domain::activity::ActivityRecord;
use crate::domain::command::{CommandId, CommandRecord, CommandStatus};
use crate::domain::component::{ComponentStatus, ComponentVersion};
use crate::domain::core::CoreId;
use crate::domain::feature::{TestResult, TestStatus};
use crate::domain::repository::{
    ActivityRepository, CommandRepository, ComponentRepository, RepositoryError,
    TestResultRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

pub struct PostgresCommandRepository {
    pool: PgPool,
}

impl PostgresCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn command_from_row(row: &PgRow) -> Result<CommandRecord, RepositoryError> {
    let status: String = row.try_get("result_status")?;
    Ok(CommandRecord {
        id: CommandId(row.try_get::<Uuid, _>("id")?),
        issuing_core: CoreId::new(row.try_get::<String, _>("core_id")?),
        command_type: row.try_get("command_type")?,
        command_body: row.try_get("command")?,
        parameters: row.try_get("parameters")?,
        result_status: CommandStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown command status '{}'", status))
        })?,
        result_payload: row.try_get("result")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
    })
}

#[async_trait]
impl CommandRepository for PostgresCommandRepository {
    async fn insert(&self, record: &CommandRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO command_history (
                id, core_id, command_type, command, parameters, result_status, result, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.0)
        .bind(record.issuing_core.as_str())
        .bind(&record.command_type)
        .bind(&record.command_body)
        .bind(&record.parameters)
        .bind(record.result_status.as_str())
        .bind(&record.result_payload)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(
        &self,
        id: CommandId,
        status: CommandStatus,
        payload: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE command_history
            SET result_status = $2, result = $3
            WHERE id = $1 AND result_status = 'pending'
            "#,
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id).await? {
                Some(existing) => Err(RepositoryError::Conflict(format!(
                    "command {} already completed as {}",
                    id,
                    existing.result_status.as_str()
                ))),
                None => Err(RepositoryError::NotFound(format!("command {}", id))),
            };
        }
        Ok(())
    }

    async fn find_by_id(&self, id: CommandId) -> Result<Option<CommandRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM command_history WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(command_from_row).transpose()
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<CommandRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM command_history ORDER BY timestamp DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(command_from_row).collect()
    }
}

pub struct PostgresActivityRepository {
    pool: PgPool,
}

impl PostgresActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn activity_from_row(row: &PgRow) -> Result<ActivityRecord, RepositoryError> {
    Ok(ActivityRecord {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        log_type: row.try_get("log_type")?,
        action: row.try_get("action")?,
        status: row.try_get("status")?,
        details: row.try_get("details")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl ActivityRepository for PostgresActivityRepository {
    async fn append(&self, record: &ActivityRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, source, log_type, action, status, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.source)
        .bind(&record.log_type)
        .bind(&record.action)
        .bind(&record.status)
        .bind(&record.details)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_recent(
        &self,
        source: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM activity_logs
            WHERE ($1::TEXT IS NULL OR source = $1)
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(source)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(activity_from_row).collect()
    }
}

pub struct PostgresComponentRepository {
    pool: PgPool,
}

impl PostgresComponentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn component_from_row(row: &PgRow) -> Result<ComponentVersion, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(ComponentVersion {
        id: row.try_get("id")?,
        component_name: row.try_get("component_name")?,
        version: row.try_get("version")?,
        status: ComponentStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown component status '{}'", status))
        })?,
        registering_core: CoreId::new(row.try_get::<String, _>("core_id")?),
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ComponentRepository for PostgresComponentRepository {
    async fn register(&self, version: &ComponentVersion) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE component_versions
            SET status = 'deprecated', updated_at = $3
            WHERE component_name = $1 AND status = 'active' AND version <> $2
            "#,
        )
        .bind(&version.component_name)
        .bind(&version.version)
        .bind(version.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO component_versions (
                id, component_name, version, status, core_id, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'active', $4, $5, $6, $7)
            ON CONFLICT (component_name, version) DO UPDATE SET
                status = 'active',
                core_id = EXCLUDED.core_id,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(version.id)
        .bind(&version.component_name)
        .bind(&version.version)
        .bind(version.registering_core.as_str())
        .bind(&version.metadata)
        .bind(version.created_at)
        .bind(version.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_core(&self, core: &CoreId) -> Result<Vec<ComponentVersion>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM component_versions WHERE core_id = $1 ORDER BY updated_at DESC",
        )
        .bind(core.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(component_from_row).collect()
    }

    async fn set_status(
        &self,
        component_name: &str,
        version: &str,
        status: ComponentStatus,
    ) -> Result<ComponentVersion, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE component_versions
            SET status = $3, updated_at = $4
            WHERE component_name = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(component_name)
        .bind(version)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            RepositoryError::NotFound(format!("component {} version {}", component_name, version))
        })?;
        component_from_row(&row)
    }
}

pub struct PostgresTestResultRepository {
    pool: PgPool,
}

impl PostgresTestResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn test_result_from_row(row: &PgRow) -> Result<TestResult, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(TestResult {
        component_name: row.try_get("component_name")?,
        test_name: row.try_get("test_name")?,
        version: row.try_get("version")?,
        status: TestStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown test status '{}'", status))
        })?,
        duration: row.try_get("duration")?,
        details: row.try_get("details")?,
        logs: row.try_get("logs")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl TestResultRepository for PostgresTestResultRepository {
    async fn save(&self, result: &TestResult) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO test_results (
                component_name, test_name, version, status, duration, details, logs, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&result.component_name)
        .bind(&result.test_name)
        .bind(&result.version)
        .bind(result.status.as_str())
        .bind(result.duration)
        .bind(&result.details)
        .bind(&result.logs)
        .bind(result.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        feature_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TestResult>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM test_results
            WHERE ($1::TEXT IS NULL OR component_name = $1)
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(feature_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(test_result_from_row).collect()
    }
}
