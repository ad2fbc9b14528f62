//! Trace & Request Context (spec §4.5)
//!
//! A task-local slot keeps `trace_id`/`request_id` alive across suspension
//! points within the handling of one request, so every log line written
//! from any continuation of that request carries the same correlation ids.
//! Grounded on the teacher's correlation-id-free logging (the teacher logs
//! per-server context ad hoc); this is the one place SPEC_FULL.md asks for
//! something the teacher doesn't already do, so the shape follows the
//! `tokio::task_local!` idiom directly rather than a teacher file. The
//! header name itself is not invented: `original_source/` uses
//! `X-Amzn-Trace-Id` consistently for this purpose, so we follow it.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const TRACE_HEADER: &str = "x-amzn-trace-id";
pub const REQUEST_ID_HEADER: &str = "x-amzn-requestid";

tokio::task_local! {
    static TRACE_CONTEXT: TraceContext;
}

#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub request_id: String,
}

impl TraceContext {
    fn synthesize(inbound: Option<&str>) -> Self {
        let trace_id = match inbound {
            Some(id) if is_plausible_trace_id(id) => id.to_string(),
            _ => new_trace_id(),
        };

        Self {
            trace_id,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Run `f` with this context installed as the active task-local. Used by
    /// the ingress middleware and by any task spawned on behalf of a request
    /// (e.g. the `Event` fire-and-forget dispatch, spec §6.1.1).
    pub async fn scope<F, T>(self, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        TRACE_CONTEXT.scope(self, f).await
    }

    /// Read the active context. Panics if called outside a request scope,
    /// mirroring `task_local!`'s own panic-on-unset behaviour — every
    /// invocation path installs one via [`middleware`].
    pub fn current() -> Self {
        TRACE_CONTEXT.with(|ctx| ctx.clone())
    }

    pub fn try_current() -> Option<Self> {
        TRACE_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }
}

fn is_plausible_trace_id(id: &str) -> bool {
    !id.is_empty() && id.len() < 256
}

fn new_trace_id() -> String {
    let epoch_hex = format!("{:x}", chrono::Utc::now().timestamp());
    let random_hex = Uuid::new_v4().simple().to_string()[..24].to_string();
    format!("Root=1-{epoch_hex}-{random_hex};Sampled=1")
}

/// Axum middleware: adopt or synthesize the trace id, mint a fresh request
/// id, install both as the active task-local for the rest of the request,
/// and echo them back on the response.
pub async fn middleware(request: Request, next: Next) -> Response {
    let inbound = request
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let ctx = TraceContext::synthesize(inbound.as_deref());
    let trace_id = ctx.trace_id.clone();
    let request_id = ctx.request_id.clone();

    let mut response = ctx.scope(next.run(request)).await;

    let headers: &mut HeaderMap = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&trace_id) {
        headers.insert(TRACE_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, v);
    }

    response
}

/// Apply the active trace id (not the request id, which is hop-local) to an
/// outbound request to the Orchestrator.
pub fn propagate(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match TraceContext::try_current() {
        Some(ctx) => builder.header(TRACE_HEADER, ctx.trace_id),
        None => builder,
    }
}

/// Build an empty body request carrying no context, used only for requests
/// issued entirely outside of a tracked invocation (startup reconciliation).
pub fn empty_body() -> Body {
    Body::empty()
}
