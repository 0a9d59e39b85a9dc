// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Core Manager HTTP surface.

use super::{json_body, liveness, ApiError, ApiResult, LimitQuery};
use crate::application::core_manager::CoreManager;
use crate::application::dispatcher::DispatchRequest;
use crate::application::supervisor::LoopSupervisor;
use crate::domain::component::ComponentStatus;
use crate::domain::core::PromotionRequest;
use crate::domain::error::OrchestratorError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const DEFAULT_LOG_LIMIT: usize = 100;
const DEFAULT_COMMAND_LIMIT: usize = 50;

#[derive(Clone)]
pub struct CoreApiState {
    pub manager: Arc<CoreManager>,
    pub supervisor: Arc<LoopSupervisor>,
}

pub fn router(state: CoreApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/execute", post(execute))
        .route("/commands", get(commands))
        .route("/components", get(components))
        .route("/components/{name}/{version}/status", post(set_component_status))
        .route("/logs", get(logs))
        .route("/feature/deploy", post(deploy))
        .route("/reconcile", post(reconcile))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<CoreApiState>) -> Json<Value> {
    let core = state.manager.state();
    let (status, loops) = liveness(&state.supervisor);
    Json(json!({
        "status": status,
        "core_id": core.core_id,
        "role": core.role,
        "core_status": core.status,
        "marker": core.marker,
        "last_health_check": core.last_health_check,
        "poll_interval_seconds": state.manager.health_interval().as_secs(),
        "marker_staleness_seconds": state.manager.marker_staleness().as_secs(),
        "loops": loops,
    }))
}

async fn status(State(state): State<CoreApiState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "core": state.manager.state(),
        "poll_interval_seconds": state.manager.health_interval().as_secs(),
        "marker_staleness_seconds": state.manager.marker_staleness().as_secs(),
    }))
}

async fn execute(
    State(state): State<CoreApiState>,
    payload: Result<Json<DispatchRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let outcome = state.manager.dispatcher().dispatch(request).await?;
    Ok(Json(json!({
        "success": outcome.succeeded(),
        "command_id": outcome.command_id,
        "status": outcome.status,
        "result": outcome.result,
    })))
}

async fn commands(
    State(state): State<CoreApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let history = state.manager.dispatcher().history(query.or(DEFAULT_COMMAND_LIMIT)).await?;
    Ok(Json(json!({ "success": true, "commands": history })))
}

async fn components(State(state): State<CoreApiState>) -> ApiResult<Json<Value>> {
    let components = state.manager.components().await?;
    Ok(Json(json!({ "success": true, "components": components })))
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn set_component_status(
    State(state): State<CoreApiState>,
    Path((name, version)): Path<(String, String)>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let update = json_body(payload)?;
    let status = ComponentStatus::parse(&update.status).ok_or_else(|| {
        ApiError(OrchestratorError::Validation(format!(
            "unknown component status '{}'",
            update.status
        )))
    })?;
    let component = state.manager.set_component_status(&name, &version, status).await?;
    Ok(Json(json!({ "success": true, "component": component })))
}

async fn logs(
    State(state): State<CoreApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let logs = state.manager.activity_log(query.or(DEFAULT_LOG_LIMIT)).await?;
    Ok(Json(json!({ "success": true, "logs": logs })))
}

async fn deploy(
    State(state): State<CoreApiState>,
    payload: Result<Json<PromotionRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let component = state.manager.promote(request).await?;
    Ok(Json(json!({ "success": true, "component": component })))
}

async fn reconcile(State(state): State<CoreApiState>) -> ApiResult<Json<Value>> {
    let report = state.manager.run_cycle().await?;
    Ok(Json(json!({ "success": true, "report": report })))
}
