// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sandbox Manager HTTP surface.

use super::{json_body, liveness, ApiResult};
use crate::application::sandbox_manager::SandboxManager;
use crate::application::supervisor::LoopSupervisor;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct SandboxApiState {
    pub sandboxes: Arc<SandboxManager>,
    pub supervisor: Arc<LoopSupervisor>,
}

pub fn router(state: SandboxApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/create", post(create))
        .route("/stop/{sandbox_id}", post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<SandboxApiState>) -> Json<Value> {
    let (status, loops) = liveness(&state.supervisor);
    Json(json!({
        "status": status,
        "active_sandboxes": state.sandboxes.active_count(),
        "loops": loops,
    }))
}

async fn status(State(state): State<SandboxApiState>) -> Json<Value> {
    let sandboxes = state.sandboxes.status().await;
    Json(json!({
        "success": true,
        "count": sandboxes.len(),
        "sandboxes": sandboxes,
    }))
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    feature_id: String,
    code: String,
}

async fn create(
    State(state): State<SandboxApiState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let instance = state.sandboxes.create(&request.feature_id, &request.code).await?;
    Ok(Json(json!({
        "success": true,
        "sandbox_id": instance.sandbox_id,
        "container_id": instance.backing_container_id,
        "feature_id": instance.owning_feature_id,
        "created_at": instance.created_at,
    })))
}

async fn stop(
    State(state): State<SandboxApiState>,
    Path(sandbox_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let outcome = state.sandboxes.stop(&sandbox_id).await?;
    Ok(Json(json!({
        "success": true,
        "sandbox_id": outcome.sandbox_id,
        "already_gone": outcome.already_gone,
    })))
}
