//! Gateway router assembly (spec §6.1)
//!
//! Grounded on the teacher's `router/mod.rs`: a shared `AppState`, global
//! middleware layered once, auth applied only to the routes that require
//! it.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfiguration;
use crate::registry::Registry;
use crate::trace as trace_ctx;

use super::auth::{handle_auth, require_auth, AuthState};
use super::breaker::BreakerRegistry;
use super::orchestrator_client::OrchestratorClient;
use super::pool::PoolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfiguration>,
    pub registry: Arc<Registry>,
    pub pools: Arc<PoolRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub orchestrator_client: Arc<OrchestratorClient>,
    /// Separate client for container-facing invocations: distinct timeout
    /// budget from the Gateway -> Orchestrator control plane client.
    pub container_http: reqwest::Client,
}

pub fn build_router(state: AppState) -> Router {
    let auth_state = AuthState {
        username: state.config.auth.username.clone(),
        password: state.config.auth.password.clone(),
        jwt_secret: state.config.auth.jwt_secret.clone(),
        token_ttl_seconds: state.config.auth.token_ttl_seconds,
    };

    let invocation_prefix = format!("/{}/functions/:function_name/invocations", state.config.registry.api_prefix);

    let auth_router: Router<()> = Router::new()
        .route(&state.config.auth.auth_path, post(handle_auth))
        .with_state(auth_state.clone());

    let protected = Router::new()
        .route(&invocation_prefix, post(super::handlers::direct_invoke))
        .fallback(super::handlers::dynamic_dispatch)
        .layer(axum::middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(super::handlers::health))
        .with_state(state)
        .merge(auth_router)
        .merge(protected)
        .layer(axum::middleware::from_fn(trace_ctx::middleware))
        .layer(TraceLayer::new_for_http())
}
