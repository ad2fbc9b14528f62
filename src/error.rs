//! Structured error taxonomy
//!
//! One `thiserror` enum per binary-facing concern, each with a single
//! `IntoResponse` impl that is the sole HTTP-boundary translation layer.
//! Pool and breaker faults are recovered locally and never reach these enums
//! except in their final, already-decided form.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the Gateway's client-facing and internal-calling paths.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("pool saturated: acquire timed out after {0:?}")]
    AcquireTimeout(std::time::Duration),

    #[error("circuit open for function {0}")]
    BreakerOpen(String),

    #[error("upstream invocation failed: {0}")]
    UpstreamTransport(String),

    #[error("upstream returned an error document: {error_type}: {error_message}")]
    UpstreamLogical {
        error_type: String,
        error_message: String,
    },

    #[error("orchestrator call failed: {0}")]
    Orchestrator(#[from] OrchestratorClientError),

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            GatewayError::RouteNotFound { method, path } => (
                StatusCode::NOT_FOUND,
                format!("no route matches {method} {path}"),
            ),
            GatewayError::FunctionNotFound(name) => {
                (StatusCode::NOT_FOUND, format!("function not found: {name}"))
            }
            GatewayError::AcquireTimeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            GatewayError::BreakerOpen(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            GatewayError::UpstreamTransport(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            GatewayError::UpstreamLogical { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            GatewayError::Orchestrator(inner) => inner.status_and_message(),
            GatewayError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GatewayError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors the Gateway's Orchestrator HTTP client can raise; also reachable
/// directly as the Orchestrator's own internal-surface error type.
#[derive(Error, Debug)]
pub enum OrchestratorClientError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("startup timed out waiting for readiness")]
    StartupTimeout,

    #[error("name conflict: {0}")]
    NameConflict(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("request to orchestrator failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected orchestrator response: {0}")]
    Protocol(String),
}

impl OrchestratorClientError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            OrchestratorClientError::ImageNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            OrchestratorClientError::StartupTimeout => {
                (StatusCode::REQUEST_TIMEOUT, self.to_string())
            }
            OrchestratorClientError::NameConflict(_) => (StatusCode::CONFLICT, self.to_string()),
            OrchestratorClientError::Engine(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            OrchestratorClientError::Transport(_) | OrchestratorClientError::Protocol(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
    }
}

/// Errors surfaced by the Orchestrator's internal HTTP surface, over the
/// Container Driver.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("startup timed out waiting for readiness")]
    StartupTimeout,

    #[error("name conflict: {0}")]
    NameConflict(String),

    #[error("container engine error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            OrchestratorError::ImageNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            OrchestratorError::StartupTimeout => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            OrchestratorError::NameConflict(_) => (StatusCode::CONFLICT, self.to_string()),
            OrchestratorError::Docker(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            OrchestratorError::FunctionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            OrchestratorError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": true,
            "detail": detail,
        }));

        (status, body).into_response()
    }
}

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
