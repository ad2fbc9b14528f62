//! Invocation procedure (spec §4.4.4)
//!
//! 1. check breaker; 2. pool.acquire; 3. POST event to the worker;
//! 4. on transport error, evict + record failure; 5. on success, parse,
//! detect logical failure, release/evict and translate the response.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::error;

use crate::driver::Worker;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::FunctionDescriptor;
use crate::trace;

use super::breaker::BreakerRegistry;
use super::event::{interpret_container_response, ContainerOutcome, EventEnvelope};
use super::orchestrator_client::OrchestratorClient;
use super::pool::PoolRegistry;

pub struct InvocationContext<'a> {
    pub pools: &'a PoolRegistry,
    pub breakers: &'a BreakerRegistry,
    pub orchestrator: &'a OrchestratorClient,
    pub http: &'a Client,
    pub invocation_path: String,
    pub invocation_timeout: Duration,
}

/// The unwrapped client-facing response after a container invocation, or
/// the async-dispatch acknowledgement.
pub struct InvocationResult {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

pub async fn invoke(
    ctx: &InvocationContext<'_>,
    function: &FunctionDescriptor,
    event: &EventEnvelope,
) -> GatewayResult<InvocationResult> {
    ctx.breakers.check(&function.name)?;

    let pool = ctx.pools.get_or_create(&function.name, function.max_capacity as usize).await;

    let orchestrator = ctx.orchestrator;
    let function_name = function.name.clone();
    let image = function.image.clone();
    let env = function.environment.clone();
    let single_instance = function.max_capacity == 1;

    let worker = pool
        .acquire(function.acquire_timeout, move |name| {
            let orchestrator = orchestrator;
            let image = image.clone();
            let env = env.clone();
            async move {
                if single_instance {
                    let resp = orchestrator
                        .ensure(&name, &image, &env)
                        .await
                        .map_err(GatewayError::Orchestrator)?;
                    Ok(Worker {
                        id: name.clone(),
                        name,
                        ip: resp.host,
                        port: resp.port,
                        created_ts: chrono::Utc::now(),
                    })
                } else {
                    let resp = orchestrator
                        .provision(&name, 1, &image, &env)
                        .await
                        .map_err(GatewayError::Orchestrator)?;
                    resp.workers
                        .into_iter()
                        .next()
                        .map(Worker::from)
                        .ok_or_else(|| GatewayError::Internal(format!("provision returned no workers for {function_name}")))
                }
            }
        })
        .await?;

    match dispatch(ctx, &worker, event).await {
        Ok(outcome) => match outcome {
            ContainerOutcome::Proxy { status, headers, body } => {
                ctx.breakers.record_success(&function.name);
                pool.release(worker);
                Ok(InvocationResult { status, headers, body })
            }
            ContainerOutcome::ErrorDocument { error_type, error_message } => {
                ctx.breakers.record_failure(&function.name);
                pool.release(worker);
                Err(GatewayError::UpstreamLogical { error_type, error_message })
            }
        },
        Err(e) => {
            error!(
                function = %function.name,
                host = %worker.ip,
                port = worker.port,
                timeout = ?function.acquire_timeout,
                error = %e,
                "container invocation transport failure"
            );
            ctx.breakers.record_failure(&function.name);
            pool.evict(&worker);
            Err(GatewayError::UpstreamTransport(e.to_string()))
        }
    }
}

async fn dispatch(
    ctx: &InvocationContext<'_>,
    worker: &Worker,
    event: &EventEnvelope,
) -> Result<ContainerOutcome, reqwest::Error> {
    let url = format!("http://{}:{}{}", worker.ip, worker.port, ctx.invocation_path);

    let builder = trace::propagate(
        ctx.http
            .post(&url)
            .timeout(ctx.invocation_timeout)
            .header("Content-Type", "application/json")
            .json(event),
    );

    let response = builder.send().await?;
    let status = response.status();

    if !status.is_success() {
        // A non-2xx from the container is a logical failure, not a
        // transport failure (spec §7 "non-2xx" vs "unreachable or dropped
        // connection"): the connection succeeded, so this never evicts the
        // worker, only ticks the breaker.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let error_type = body
            .get("errorType")
            .and_then(Value::as_str)
            .unwrap_or("UpstreamHttpError")
            .to_string();
        let error_message = body
            .get("errorMessage")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("container returned HTTP {status}"));
        return Ok(ContainerOutcome::ErrorDocument { error_type, error_message });
    }

    let raw: Value = response.json().await?;
    Ok(interpret_container_response(&raw))
}
