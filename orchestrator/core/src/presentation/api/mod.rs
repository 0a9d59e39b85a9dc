// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Axum routers, one per component process, plus the shared error mapping.
//!
//! Every failure is returned as `{"success": false, "error": "<reason>"}`
//! with a status derived from the [`OrchestratorError`] kind. The reason is
//! human-readable; source errors are logged and never sent.

pub mod core;
pub mod monitor;
pub mod recovery;
pub mod runner;
pub mod sandbox;

use crate::application::supervisor::{LoopHealth, LoopSupervisor};
use crate::domain::error::OrchestratorError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Conflict(_) => StatusCode::CONFLICT,
            OrchestratorError::ForbiddenOperation(_) => StatusCode::FORBIDDEN,
            OrchestratorError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::IntegrityViolation(_)
            | OrchestratorError::SandboxFailure(_)
            | OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<OrchestratorError>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        } else {
            warn!(kind = self.0.kind(), "Request rejected: {}", self.0);
        }
        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Unwrap a JSON body, turning axum's rejection into a validation error.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(OrchestratorError::Validation(rejection.body_text())))
}

/// `?limit=N` query.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}

/// `healthy` when every supervised loop is alive, `degraded` otherwise.
pub fn liveness(supervisor: &LoopSupervisor) -> (&'static str, Vec<LoopHealth>) {
    let loops = supervisor.health();
    let status = if loops.iter().all(|l| l.running) {
        "healthy"
    } else {
        "degraded"
    };
    (status, loops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let status = |e: OrchestratorError| ApiError(e).status_code();
        assert_eq!(status(OrchestratorError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(OrchestratorError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(OrchestratorError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(OrchestratorError::ForbiddenOperation("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(OrchestratorError::DependencyUnavailable {
                dependency: "container runtime",
                reason: "x".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(OrchestratorError::SandboxFailure("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
