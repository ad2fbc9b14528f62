//! Orchestrator internal HTTP surface (spec §6.4)
//!
//! Grounded on the teacher's `routes/containers.rs` (plain axum handlers
//! over a shared `AppState`) and `router/mod.rs` (router assembly, global
//! middleware layering).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use super::Orchestrator;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::trace as trace_ctx;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/containers/ensure", post(ensure))
        .route("/containers/provision", post(provision))
        .route("/containers/heartbeat", post(heartbeat))
        .layer(axum::middleware::from_fn(trace_ctx::middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let docker_ok = state.orchestrator.driver().ping().await.is_ok();
    Json(json!({ "status": "healthy", "docker": docker_ok }))
}

#[derive(Debug, Deserialize)]
struct EnsureRequest {
    function_name: String,
    image: Option<String>,
    env: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct EnsureResponse {
    host: String,
    port: u16,
}

#[instrument(skip(state, req), fields(function = %req.function_name))]
async fn ensure(
    State(state): State<AppState>,
    Json(req): Json<EnsureRequest>,
) -> OrchestratorResult<Json<EnsureResponse>> {
    let image = req
        .image
        .ok_or_else(|| OrchestratorError::FunctionNotFound(req.function_name.clone()))?;
    let env = req.env.unwrap_or_default();

    let (host, port) = state
        .orchestrator
        .ensure(&req.function_name, &image, &env)
        .await?;

    Ok(Json(EnsureResponse { host, port }))
}

#[derive(Debug, Deserialize)]
struct ProvisionRequest {
    function_name: String,
    count: u32,
    image: Option<String>,
    env: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct ProvisionedWorker {
    id: String,
    name: String,
    ip_address: String,
    port: u16,
}

#[derive(Debug, Serialize)]
struct ProvisionResponse {
    workers: Vec<ProvisionedWorker>,
}

#[instrument(skip(state, req), fields(function = %req.function_name, count = req.count))]
async fn provision(
    State(state): State<AppState>,
    Json(req): Json<ProvisionRequest>,
) -> OrchestratorResult<Json<ProvisionResponse>> {
    if req.count == 0 {
        return Err(OrchestratorError::Internal("count must be >= 1".to_string()));
    }

    let image = req
        .image
        .ok_or_else(|| OrchestratorError::FunctionNotFound(req.function_name.clone()))?;
    let env = req.env.unwrap_or_default();
    let invocation_port = state.orchestrator.config().invocation.port;

    let workers = state
        .orchestrator
        .provision(&req.function_name, req.count, &image, &env)
        .await?;

    Ok(Json(ProvisionResponse {
        workers: workers
            .into_iter()
            .map(|w| ProvisionedWorker {
                id: w.id,
                name: w.name,
                ip_address: w.ip,
                port: invocation_port,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    function_name: String,
    container_names: Vec<String>,
}

#[instrument(skip(state, req), fields(function = %req.function_name, count = req.container_names.len()))]
async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Json<serde_json::Value> {
    state
        .orchestrator
        .heartbeat(&req.function_name, &req.container_names);
    Json(json!({ "status": "ok" }))
}
