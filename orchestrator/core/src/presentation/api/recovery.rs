// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Recovery Supervisor HTTP surface.

use super::{liveness, ApiError, ApiResult};
use crate::application::recovery::RecoverySupervisor;
use crate::application::supervisor::LoopSupervisor;
use crate::domain::error::OrchestratorError;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct RecoveryApiState {
    pub recovery: Arc<RecoverySupervisor>,
    pub supervisor: Arc<LoopSupervisor>,
}

pub fn router(state: RecoveryApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/backup", post(backup))
        .route("/restore", post(restore))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<RecoveryApiState>) -> Json<Value> {
    let (status, loops) = liveness(&state.supervisor);
    let last = state.recovery.last_report();
    Json(json!({
        "status": status,
        "last_cycle": last.as_ref().map(|r| r.timestamp),
        "integral": last.as_ref().map(|r| r.integrity.integral),
        "interval_seconds": state.recovery.settings().interval.as_secs(),
        "loops": loops,
    }))
}

async fn status(State(state): State<RecoveryApiState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "report": state.recovery.last_report(),
    }))
}

async fn backup(State(state): State<RecoveryApiState>) -> ApiResult<Json<Value>> {
    let path = state.recovery.create_backup().await?;
    Ok(Json(json!({ "success": true, "backup": path })))
}

#[derive(Debug, Default, Deserialize)]
struct RestoreRequest {
    #[serde(default)]
    backup: Option<PathBuf>,
}

async fn restore(
    State(state): State<RecoveryApiState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    // an empty body restores the newest backup
    let request: RestoreRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RestoreRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError(OrchestratorError::Validation(format!("Invalid restore request: {}", e))))?
    };
    let restored = state.recovery.restore_system(request.backup.as_deref()).await?;
    Ok(Json(json!({ "success": true, "restored_from": restored })))
}
