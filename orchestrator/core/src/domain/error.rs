// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cross-cutting failure taxonomy.
//!
//! Adapter errors (`RuntimeError`, `LLMError`, `RepositoryError`, ...) are
//! folded into one of five kinds at the application boundary. The
//! presentation layer maps each kind to an HTTP status and a
//! human-readable reason; the source error is logged, not returned.

use crate::domain::command::CommandValidationError;
use crate::domain::core::{CoreClientError, StoreError};
use crate::domain::feature::FeatureError;
use crate::domain::llm::LLMError;
use crate::domain::process::{EnvironmentError, ProcessError};
use crate::domain::repository::RepositoryError;
use crate::domain::runtime::RuntimeError;
use crate::domain::sandbox::SandboxError;
use crate::domain::source_control::SourceControlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed or missing request fields, rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Request is well-formed but conflicts with this process's current role.
    #[error("{0}")]
    Conflict(String),

    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable { dependency: &'static str, reason: String },

    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Sandbox failure: {0}")]
    SandboxFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "validation",
            OrchestratorError::NotFound(_) => "not_found",
            OrchestratorError::Conflict(_) => "conflict",
            OrchestratorError::DependencyUnavailable { .. } => "dependency_unavailable",
            OrchestratorError::ForbiddenOperation(_) => "forbidden_operation",
            OrchestratorError::IntegrityViolation(_) => "integrity_violation",
            OrchestratorError::SandboxFailure(_) => "sandbox_failure",
            OrchestratorError::Internal(_) => "internal",
        }
    }
}

impl From<FeatureError> for OrchestratorError {
    fn from(err: FeatureError) -> Self {
        OrchestratorError::Validation(err.to_string())
    }
}

impl From<CommandValidationError> for OrchestratorError {
    fn from(err: CommandValidationError) -> Self {
        OrchestratorError::Validation(err.to_string())
    }
}

impl From<RuntimeError> for OrchestratorError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(name) => OrchestratorError::NotFound(name),
            other => OrchestratorError::DependencyUnavailable {
                dependency: "container runtime",
                reason: other.to_string(),
            },
        }
    }
}

impl From<LLMError> for OrchestratorError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::InvalidInput(msg) => OrchestratorError::Validation(msg),
            other => OrchestratorError::DependencyUnavailable {
                dependency: "language model",
                reason: other.to_string(),
            },
        }
    }
}

impl From<SourceControlError> for OrchestratorError {
    fn from(err: SourceControlError) -> Self {
        OrchestratorError::DependencyUnavailable {
            dependency: "source control",
            reason: err.to_string(),
        }
    }
}

impl From<RepositoryError> for OrchestratorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => OrchestratorError::NotFound(what),
            RepositoryError::Conflict(what) => OrchestratorError::Conflict(what),
            other => OrchestratorError::DependencyUnavailable {
                dependency: "audit store",
                reason: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        OrchestratorError::DependencyUnavailable {
            dependency: "shared state",
            reason: err.to_string(),
        }
    }
}

impl From<CoreClientError> for OrchestratorError {
    fn from(err: CoreClientError) -> Self {
        match err {
            CoreClientError::UnknownCore(id) => {
                OrchestratorError::Validation(format!("Unknown core id: {}", id))
            }
            other => OrchestratorError::DependencyUnavailable {
                dependency: "core manager",
                reason: other.to_string(),
            },
        }
    }
}

impl From<SandboxError> for OrchestratorError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::InvalidRequest(msg) => OrchestratorError::Validation(msg),
            other => OrchestratorError::SandboxFailure(other.to_string()),
        }
    }
}

impl From<ProcessError> for OrchestratorError {
    fn from(err: ProcessError) -> Self {
        OrchestratorError::DependencyUnavailable {
            dependency: "host process",
            reason: err.to_string(),
        }
    }
}

impl From<EnvironmentError> for OrchestratorError {
    fn from(err: EnvironmentError) -> Self {
        OrchestratorError::SandboxFailure(err.to_string())
    }
}
