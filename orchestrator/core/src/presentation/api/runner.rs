// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feature Test Runner HTTP surface.

use super::{json_body, liveness, ApiError, ApiResult};
use crate::application::feature_runner::FeatureRunner;
use crate::application::supervisor::LoopSupervisor;
use crate::domain::error::OrchestratorError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const DEFAULT_RESULT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct RunnerApiState {
    pub runner: Arc<FeatureRunner>,
    pub supervisor: Arc<LoopSupervisor>,
}

pub fn router(state: RunnerApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/test", post(enqueue))
        .route("/results", get(results))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<RunnerApiState>) -> Json<Value> {
    let (status, loops) = liveness(&state.supervisor);
    Json(json!({
        "status": status,
        "queue_depth": state.runner.queue_depth(),
        "current": state.runner.current(),
        "loops": loops,
    }))
}

#[derive(Debug, Deserialize)]
struct TestRequest {
    feature_config: Option<Value>,
}

async fn enqueue(
    State(state): State<RunnerApiState>,
    payload: Result<Json<TestRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let config = request.feature_config.ok_or_else(|| {
        ApiError(OrchestratorError::Validation("feature_config is required".to_string()))
    })?;
    let receipt = state.runner.enqueue(&config)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Feature {} queued for testing", receipt.feature),
        "feature": receipt.feature,
        "version": receipt.version,
        "queue_position": receipt.queue_position,
    })))
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    feature_name: Option<String>,
    limit: Option<usize>,
}

async fn results(
    State(state): State<RunnerApiState>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Json<Value>> {
    let results = state
        .runner
        .results(query.feature_name.as_deref(), query.limit.unwrap_or(DEFAULT_RESULT_LIMIT))
        .await?;
    Ok(Json(json!({ "success": true, "results": results })))
}
