// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! System Monitor HTTP surface.

use super::{json_body, liveness, ApiResult};
use crate::application::supervisor::LoopSupervisor;
use crate::application::system_monitor::SystemMonitor;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct MonitorApiState {
    pub monitor: Arc<SystemMonitor>,
    pub supervisor: Arc<LoopSupervisor>,
}

pub fn router(state: MonitorApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/components", get(components))
        .route("/switch_core", post(switch_core))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<MonitorApiState>) -> Json<Value> {
    let (status, loops) = liveness(&state.supervisor);
    let summary = state.monitor.latest();
    Json(json!({
        "status": status,
        "overall_health": summary.overall_health,
        "active_core": summary.active_core,
        "last_updated": summary.last_updated,
        "components": summary.components,
        "loops": loops,
    }))
}

async fn components(State(state): State<MonitorApiState>) -> Json<Value> {
    let summary = state.monitor.latest();
    Json(json!({ "success": true, "components": summary.components }))
}

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    core_id: String,
}

async fn switch_core(
    State(state): State<MonitorApiState>,
    payload: Result<Json<SwitchRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let outcome = state.monitor.switch_core(&request.core_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": outcome.message,
        "core_id": outcome.core_id,
        "changed": outcome.changed,
        "marker_version": outcome.marker_version,
    })))
}
