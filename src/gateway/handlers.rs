//! Gateway request handlers (spec §6.1)
//!
//! Grounded on the teacher's `router/handlers/servers.rs` (plain axum
//! handlers pulling `Path`/`State`/`Json` extractors, returning the crate's
//! `Result` error type directly so `IntoResponse` does the translation).

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};

use super::auth::AuthenticatedSubject;
use super::event::{build_event, EventInput};
use super::invoke::{invoke, InvocationContext, InvocationResult};
use super::router::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| remote.ip().to_string())
}

fn invocation_context(state: &AppState) -> InvocationContext<'_> {
    InvocationContext {
        pools: &state.pools,
        breakers: &state.breakers,
        orchestrator: &state.orchestrator_client,
        http: &state.container_http,
        invocation_path: state.config.invocation.path.clone(),
        invocation_timeout: std::time::Duration::from_secs(state.config.invocation.timeout_seconds),
    }
}

fn result_to_response(result: InvocationResult) -> Response {
    let mut response = Response::builder().status(result.status);
    for (key, value) in &result.headers {
        response = response.header(key, value);
    }
    let body = result.body.unwrap_or_default();
    response.body(axum::body::Body::from(body)).unwrap()
}

/// Any request matching a configured route (spec §6.1): build the event,
/// dispatch it, and unwrap the proxy response verbatim.
pub async fn dynamic_dispatch(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: axum::http::Uri,
    version: axum::http::Version,
    headers: HeaderMap,
    subject: Option<axum::Extension<AuthenticatedSubject>>,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let query = uri.query().unwrap_or("");

    let Some(matched) = state.registry.matches(method.as_str(), path) else {
        return GatewayError::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        }
        .into_response();
    };

    let Some(function) = state.registry.get_function(matched.function_name) else {
        return GatewayError::FunctionNotFound(matched.function_name.to_string()).into_response();
    };

    let subject = subject.map(|ext| ext.0 .0).unwrap_or_else(|| "anonymous".to_string());

    let event = build_event(EventInput {
        method: &method,
        raw_path: path,
        matched_pattern: matched.matched_pattern,
        headers: &headers,
        query,
        path_parameters: matched.path_params,
        body: &body,
        source_ip: client_ip(&headers, remote),
        subject,
        stage: "local".to_string(),
        protocol: format!("{version:?}"),
    });

    let ctx = invocation_context(&state);
    match invoke(&ctx, function, &event).await {
        Ok(result) => result_to_response(result),
        Err(e) => e.into_response(),
    }
}

/// `POST /<api_prefix>/functions/<function_name>/invocations` (spec §6.1.1).
/// `X-Amz-Invocation-Type: Event` dispatches asynchronously and returns 202
/// immediately; `RequestResponse` (the default) blocks for the result.
pub async fn direct_invoke(
    State(state): State<AppState>,
    Path(function_name): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    subject: Option<axum::Extension<AuthenticatedSubject>>,
    body: Bytes,
) -> GatewayResult<Response> {
    let function = state
        .registry
        .get_function(&function_name)
        .ok_or_else(|| GatewayError::FunctionNotFound(function_name.clone()))?;

    let invocation_type = headers
        .get("x-amz-invocation-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("RequestResponse")
        .to_string();

    let subject = subject.map(|ext| ext.0 .0).unwrap_or_else(|| "anonymous".to_string());
    let path = format!("/{}/functions/{}/invocations", state.config.registry.api_prefix, function_name);

    let event = build_event(EventInput {
        method: &Method::POST,
        raw_path: &path,
        matched_pattern: &path,
        headers: &headers,
        query: "",
        path_parameters: Default::default(),
        body: &body,
        source_ip: client_ip(&headers, remote),
        subject,
        stage: "local".to_string(),
        protocol: "HTTP/1.1".to_string(),
    });

    if invocation_type.eq_ignore_ascii_case("Event") {
        let state = state.clone();
        let function = function.clone();
        tokio::spawn(async move {
            let ctx = invocation_context(&state);
            if let Err(e) = invoke(&ctx, &function, &event).await {
                warn!(function = %function.name, error = %e, "fire-and-forget invocation failed");
            }
        });
        return Ok((axum::http::StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response());
    }

    let ctx = invocation_context(&state);
    let result = invoke(&ctx, function, &event).await?;
    Ok(result_to_response(result))
}
