//! HTTP client: Gateway → Orchestrator (spec §6.4)
//!
//! Grounded on the teacher's `api/client.rs` (reqwest + retry on transient
//! failures), but retry is delegated to the `backoff` crate's exponential
//! backoff instead of the teacher's hand-rolled loop — the interface this
//! client serves (ensure/provision/heartbeat) only ever needs "retry a
//! handful of times with growing delay", which is exactly what `backoff`
//! is for.

use std::collections::HashMap;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::OrchestratorRemoteConfiguration;
use crate::driver::Worker;
use crate::error::OrchestratorClientError;
use crate::trace;

pub struct OrchestratorClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl OrchestratorClient {
    pub fn new(config: &OrchestratorRemoteConfiguration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("reqwest client builds with static config");

        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, OrchestratorClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;

        retry(self.backoff(), || async {
            attempt += 1;
            let builder = trace::propagate(self.http.post(&url).json(body));

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    backoff::Error::transient(OrchestratorClientError::Transport(e))
                } else {
                    backoff::Error::permanent(OrchestratorClientError::Transport(e))
                }
            })?;

            let status = response.status();
            if status.is_server_error() {
                if attempt <= self.max_retries {
                    warn!(%url, %status, attempt, "orchestrator call failed, retrying");
                    return Err(backoff::Error::transient(OrchestratorClientError::Engine(
                        format!("orchestrator returned {status}"),
                    )));
                }
                return Err(backoff::Error::permanent(OrchestratorClientError::Engine(
                    format!("orchestrator returned {status}"),
                )));
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                let detail = extract_detail(response).await;
                return Err(backoff::Error::permanent(OrchestratorClientError::ImageNotFound(detail)));
            }

            if status == reqwest::StatusCode::REQUEST_TIMEOUT {
                return Err(backoff::Error::permanent(OrchestratorClientError::StartupTimeout));
            }

            if status == reqwest::StatusCode::CONFLICT {
                let detail = extract_detail(response).await;
                return Err(backoff::Error::permanent(OrchestratorClientError::NameConflict(detail)));
            }

            if status.is_client_error() {
                let detail = extract_detail(response).await;
                return Err(backoff::Error::permanent(OrchestratorClientError::Engine(detail)));
            }

            response
                .json::<Resp>()
                .await
                .map_err(|e| backoff::Error::permanent(OrchestratorClientError::Transport(e)))
        })
        .await
    }

    pub async fn ensure(
        &self,
        function_name: &str,
        image: &str,
        env: &HashMap<String, String>,
    ) -> Result<EnsureResponse, OrchestratorClientError> {
        let req = EnsureRequest {
            function_name: function_name.to_string(),
            image: Some(image.to_string()),
            env: Some(env.clone()),
        };
        self.post("/containers/ensure", &req).await
    }

    pub async fn provision(
        &self,
        function_name: &str,
        count: u32,
        image: &str,
        env: &HashMap<String, String>,
    ) -> Result<ProvisionResponse, OrchestratorClientError> {
        let req = ProvisionRequest {
            function_name: function_name.to_string(),
            count,
            image: Some(image.to_string()),
            env: Some(env.clone()),
        };
        self.post("/containers/provision", &req).await
    }

    pub async fn heartbeat(
        &self,
        function_name: &str,
        container_names: &[String],
    ) -> Result<(), OrchestratorClientError> {
        let req = HeartbeatRequest {
            function_name: function_name.to_string(),
            container_names: container_names.to_vec(),
        };
        let _: serde_json::Value = self.post("/containers/heartbeat", &req).await?;
        Ok(())
    }
}

async fn extract_detail(response: reqwest::Response) -> String {
    match response.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("detail")
            .and_then(|v| v.as_str())
            .unwrap_or("no detail")
            .to_string(),
        Err(_) => "no detail".to_string(),
    }
}

#[derive(Debug, Serialize)]
struct EnsureRequest {
    function_name: String,
    image: Option<String>,
    env: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct EnsureResponse {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize)]
struct ProvisionRequest {
    function_name: String,
    count: u32,
    image: Option<String>,
    env: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionedWorker {
    pub id: String,
    pub name: String,
    pub ip_address: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionResponse {
    pub workers: Vec<ProvisionedWorker>,
}

impl From<ProvisionedWorker> for Worker {
    fn from(w: ProvisionedWorker) -> Self {
        Worker {
            id: w.id,
            name: w.name,
            ip: w.ip_address,
            port: w.port,
            created_ts: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest {
    function_name: String,
    container_names: Vec<String>,
}
