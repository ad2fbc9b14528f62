//! Container Driver (spec §4.1)
//!
//! A thin async wrapper over bollard. Every engine call passes through a
//! `tokio::sync::Semaphore` sized `docker.max_concurrent_ops` so a burst of
//! `ensure`/`provision` calls cannot flood the Docker API with simultaneous
//! round-trips — this is the idiomatic Rust rendering of "engine calls never
//! block request-serving threads" (spec §4.1, §5): bollard I/O is already
//! non-blocking, so the bound is a concurrency limiter rather than a
//! thread-pool handoff. Grounded on the teacher's `docker/service.rs`
//! (bollard call shapes, 404/409 status-code idempotency handling) and
//! `environment/docker/container.rs` (image-pull-before-create, label
//! conventions).

mod types;

pub use types::{ContainerStatus, Inspection, Worker};

use std::collections::HashMap;
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("name conflict: {0}")]
    NameConflict(String),

    #[error("container engine error: {0}")]
    Engine(#[from] BollardError),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

pub struct ContainerDriver {
    client: Docker,
    limiter: Arc<Semaphore>,
    network: String,
    /// `(key, value)` stamped on every container this driver creates, and
    /// the same pair every `list`/`prune_by_label` filter should use —
    /// derived from `docker.product_label` (spec §4.1 "label the container
    /// with a stable marker, `created_by=<product>`").
    product_label: (String, String),
}

impl ContainerDriver {
    pub fn connect(
        socket_path: &str,
        network: String,
        max_concurrent_ops: usize,
        product_label: &str,
    ) -> DriverResult<Self> {
        let client = Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)?;
        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(max_concurrent_ops.max(1))),
            network,
            product_label: parse_label(product_label),
        })
    }

    /// The `k=v` label this driver stamps on and filters by, as used for
    /// display (e.g. the diagnostics subcommand).
    pub fn product_label(&self) -> String {
        format!("{}={}", self.product_label.0, self.product_label.1)
    }

    pub async fn ping(&self) -> DriverResult<()> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");
        self.client.ping().await?;
        Ok(())
    }

    /// Pull (if needed), create, start and label a container. Idempotent
    /// with respect to an already-present image; surfaces `NameConflict` if
    /// the name is taken by a container left over from a lost create/create
    /// race (spec §4.2 tells callers to re-inspect and fall through).
    pub async fn create_and_start(
        &self,
        image: &str,
        name: &str,
        env: &HashMap<String, String>,
        labels: &HashMap<String, String>,
    ) -> DriverResult<Worker> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");

        self.ensure_image(image).await?;

        let env_vars: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut all_labels = labels.clone();
        all_labels.insert(self.product_label.0.clone(), self.product_label.1.clone());

        let host_config = HostConfig {
            network_mode: Some(self.network.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.to_string()),
            env: Some(env_vars),
            labels: Some(all_labels),
            host_config: Some(host_config),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let response = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError { status_code: 409, .. } => {
                    DriverError::NameConflict(name.to_string())
                }
                other => DriverError::Engine(other),
            })?;

        self.client
            .start_container::<String>(&response.id, None)
            .await?;

        info!(container = %name, id = %response.id, "created and started container");

        let ip = self.inspect_ip(&response.id).await?;

        Ok(Worker {
            id: response.id,
            name: name.to_string(),
            ip: ip.unwrap_or_default(),
            port: 0,
            created_ts: Utc::now(),
        })
    }

    pub async fn start(&self, id: &str) -> DriverResult<()> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");
        self.client.start_container::<String>(id, None).await?;
        Ok(())
    }

    /// No-op if already stopped (spec §4.1 idempotency contract).
    pub async fn stop(&self, id: &str) -> DriverResult<()> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");
        match self
            .client
            .stop_container(id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// No-op if the container is already gone (spec §4.1 idempotency contract).
    pub async fn remove(&self, id: &str, force: bool) -> DriverResult<()> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");
        let options = RemoveContainerOptions { force, v: true, ..Default::default() };
        match self.client.remove_container(id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns current status + IP, or `ContainerStatus::Missing` if unknown
    /// to the engine (the caller must distinguish this from an error).
    pub async fn inspect(&self, name_or_id: &str) -> DriverResult<Inspection> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");
        match self.client.inspect_container(name_or_id, None).await {
            Ok(details) => {
                let status = details
                    .state
                    .as_ref()
                    .and_then(|s| s.status)
                    .map(docker_status_to_status)
                    .unwrap_or(ContainerStatus::Dead);

                let ip = details
                    .network_settings
                    .as_ref()
                    .and_then(|ns| ns.networks.as_ref())
                    .and_then(|nets| nets.values().next())
                    .and_then(|net| net.ip_address.clone())
                    .filter(|ip| !ip.is_empty());

                Ok(Inspection {
                    status,
                    ip,
                    id: details.id.unwrap_or_else(|| name_or_id.to_string()),
                })
            }
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(Inspection {
                status: ContainerStatus::Missing,
                ip: None,
                id: name_or_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists containers carrying every label in `label_filter` (`k=v` form).
    pub async fn list(&self, label_filter: &[String]) -> DriverResult<Vec<Worker>> {
        let _permit = self.limiter.acquire().await.expect("semaphore never closed");

        let mut filters = HashMap::new();
        filters.insert("label".to_string(), label_filter.to_vec());

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        let workers = containers
            .into_iter()
            .map(|c| Worker {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|n| n.first().cloned())
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                ip: String::new(),
                port: 0,
                created_ts: c
                    .created
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .unwrap_or_else(Utc::now),
            })
            .collect();

        Ok(workers)
    }

    /// Terminal cleanup at teardown: force-remove everything carrying the
    /// given label, best-effort per container.
    pub async fn prune_by_label(&self, label: &str) -> DriverResult<usize> {
        let workers = self.list(&[label.to_string()]).await?;
        let mut removed = 0;
        for worker in &workers {
            match self.remove(&worker.id, true).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(container = %worker.name, error = %e, "failed to prune container"),
            }
        }
        Ok(removed)
    }

    async fn ensure_image(&self, image: &str) -> DriverResult<()> {
        match self.client.inspect_image(image).await {
            Ok(_) => {
                debug!(%image, "image already present");
                return Ok(());
            }
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                info!(%image, "image not found locally, pulling");
            }
            Err(e) => {
                warn!(%image, error = %e, "error inspecting image, attempting pull anyway");
            }
        }

        let options = CreateImageOptions { from_image: image, ..Default::default() };
        let mut stream = self.client.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(%image, %status, "pull progress");
                    }
                }
                Err(BollardError::DockerResponseNotFoundError { .. }) => {
                    return Err(DriverError::ImageNotFound(image.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn inspect_ip(&self, id: &str) -> DriverResult<Option<String>> {
        let details = self.client.inspect_container(id, None).await?;
        Ok(details
            .network_settings
            .and_then(|ns| ns.networks)
            .and_then(|nets| nets.values().next().cloned())
            .and_then(|net| net.ip_address)
            .filter(|ip| !ip.is_empty()))
    }
}

/// Splits a `k=v` label into its pair; a value-less label is treated as
/// `(label, "")` rather than rejected, so a misconfigured product label
/// still stamps and filters consistently instead of panicking at startup.
fn parse_label(raw: &str) -> (String, String) {
    match raw.split_once('=') {
        Some((k, v)) => (k.to_string(), v.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

fn docker_status_to_status(status: ContainerStateStatusEnum) -> ContainerStatus {
    match status {
        ContainerStateStatusEnum::RUNNING => ContainerStatus::Running,
        ContainerStateStatusEnum::EXITED => ContainerStatus::Exited,
        ContainerStateStatusEnum::PAUSED => ContainerStatus::Paused,
        ContainerStateStatusEnum::CREATED => ContainerStatus::Created,
        ContainerStateStatusEnum::RESTARTING => ContainerStatus::Restarting,
        ContainerStateStatusEnum::REMOVING => ContainerStatus::Removing,
        _ => ContainerStatus::Dead,
    }
}
