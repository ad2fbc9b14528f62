//! Orchestrator (spec §4.2)
//!
//! Owns container lifecycle and the desired-state map
//! `container_name -> last_access`. Grounded on the teacher's
//! `server/manager.rs` (a `DashMap`-keyed registry guarding concurrent
//! per-entity operations) and `system/locker.rs` (the per-name mutex).

mod reaper;
mod reconcile;
pub mod server;

pub use reaper::run_reaper;
pub use reconcile::reconcile_at_startup;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfiguration;
use crate::driver::{ContainerDriver, ContainerStatus, Worker};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::system::Locker;

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn instance_name(function_name: &str) -> String {
    format!("lambda-{function_name}")
}

fn provisioned_name(function_name: &str) -> String {
    format!("lambda-{function_name}-{}", short_suffix())
}

pub struct Orchestrator {
    driver: ContainerDriver,
    config: OrchestratorConfiguration,
    http: reqwest::Client,
    last_access: DashMap<String, Instant>,
    lockers: DashMap<String, Arc<Locker>>,
}

impl Orchestrator {
    pub fn new(driver: ContainerDriver, config: OrchestratorConfiguration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.readiness.timeout_seconds))
            .build()
            .expect("reqwest client builds with static config");

        Self {
            driver,
            config,
            http,
            last_access: DashMap::new(),
            lockers: DashMap::new(),
        }
    }

    pub fn driver(&self) -> &ContainerDriver {
        &self.driver
    }

    pub fn config(&self) -> &OrchestratorConfiguration {
        &self.config
    }

    fn locker_for(&self, name: &str) -> Arc<Locker> {
        self.lockers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Locker::new()))
            .clone()
    }

    fn touch(&self, name: &str) {
        self.last_access.insert(name.to_string(), Instant::now());
    }

    /// `ensure(function_name, image, env) -> (host, port)` (spec §4.2).
    pub async fn ensure(
        &self,
        function_name: &str,
        image: &str,
        env: &HashMap<String, String>,
    ) -> OrchestratorResult<(String, u16)> {
        let name = instance_name(function_name);
        let locker = self.locker_for(&name);
        let _guard = locker.acquire().await.map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        self.ensure_locked(function_name, &name, image, env).await
    }

    async fn ensure_locked(
        &self,
        function_name: &str,
        name: &str,
        image: &str,
        env: &HashMap<String, String>,
    ) -> OrchestratorResult<(String, u16)> {
        let inspection = self.driver.inspect(name).await.map_err(map_driver_error)?;

        match inspection.status {
            ContainerStatus::Running => {
                let ip = inspection.ip.ok_or_else(|| {
                    OrchestratorError::Internal(format!("running container {name} has no IP"))
                })?;
                self.await_readiness(&ip).await?;
                self.touch(name);
                Ok((ip, self.config.invocation.port))
            }
            ContainerStatus::Exited => {
                self.driver.start(&inspection.id).await.map_err(map_driver_error)?;
                let ip = self.wait_for_ip(&inspection.id).await?;
                self.await_readiness(&ip).await?;
                self.touch(name);
                Ok((ip, self.config.invocation.port))
            }
            ContainerStatus::Missing => {
                self.create_and_wait(function_name, name, image, env).await
            }
            _ => {
                // paused / created / restarting / removing: force-remove then
                // proceed as missing (spec §4.2).
                self.driver.remove(&inspection.id, true).await.map_err(map_driver_error)?;
                self.create_and_wait(function_name, name, image, env).await
            }
        }
    }

    async fn create_and_wait(
        &self,
        function_name: &str,
        name: &str,
        image: &str,
        env: &HashMap<String, String>,
    ) -> OrchestratorResult<(String, u16)> {
        let labels = function_labels(function_name);
        let worker = match self.driver.create_and_start(image, name, env, &labels).await {
            Ok(w) => w,
            Err(crate::driver::DriverError::NameConflict(_)) => {
                // Lost a create/create race; re-inspect and fall through
                // (spec §4.2 "On engine NameConflict during create ...").
                debug!(container = %name, "create race lost, re-inspecting");
                return Box::pin(self.ensure_locked(function_name, name, image, env)).await;
            }
            Err(e) => return Err(map_driver_error(e)),
        };

        self.await_readiness(&worker.ip).await?;
        self.touch(name);
        Ok((worker.ip, self.config.invocation.port))
    }

    async fn wait_for_ip(&self, id: &str) -> OrchestratorResult<String> {
        let inspection = self.driver.inspect(id).await.map_err(map_driver_error)?;
        inspection
            .ip
            .ok_or_else(|| OrchestratorError::Internal(format!("container {id} has no IP after start")))
    }

    /// `provision(function_name, count, image, env) -> [worker...]` (spec
    /// §4.2). All-or-nothing: on partial failure, every container created
    /// in this call is removed before the error propagates.
    pub async fn provision(
        &self,
        function_name: &str,
        count: u32,
        image: &str,
        env: &HashMap<String, String>,
    ) -> OrchestratorResult<Vec<Worker>> {
        let labels = function_labels(function_name);
        let mut created = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let name = provisioned_name(function_name);
            match self.driver.create_and_start(image, &name, env, &labels).await {
                Ok(worker) => match self.await_readiness(&worker.ip).await {
                    Ok(()) => {
                        self.touch(&name);
                        created.push(worker);
                    }
                    Err(e) => {
                        warn!(function = %function_name, container = %name, error = %e, "readiness failed during provision, rolling back");
                        self.rollback(&created, &name).await;
                        return Err(e);
                    }
                },
                Err(e) => {
                    warn!(function = %function_name, container = %name, error = %e, "create failed during provision, rolling back");
                    self.rollback(&created, &name).await;
                    return Err(map_driver_error(e));
                }
            }
        }

        Ok(created)
    }

    async fn rollback(&self, created: &[Worker], also_remove_name: &str) {
        for worker in created {
            let _ = self.driver.remove(&worker.id, true).await;
            self.last_access.remove(&worker.name);
            self.lockers.remove(&worker.name);
        }
        let _ = self.driver.remove(also_remove_name, true).await;
        self.last_access.remove(also_remove_name);
        self.lockers.remove(also_remove_name);
    }

    /// `heartbeat(function_name, [container_names])` (spec §4.2). Unknown
    /// names are silently accepted.
    pub fn heartbeat(&self, _function_name: &str, container_names: &[String]) {
        for name in container_names {
            self.touch(name);
        }
    }

    /// Probe `{"ping": true}` every `probe_interval_ms` up to
    /// `readiness.timeout_seconds` (spec §4.2).
    async fn await_readiness(&self, ip: &str) -> OrchestratorResult<()> {
        let url = format!(
            "http://{ip}:{}{}",
            self.config.invocation.port, self.config.invocation.path
        );
        let deadline = Instant::now() + Duration::from_secs(self.config.readiness.timeout_seconds);
        let interval = Duration::from_millis(self.config.readiness.probe_interval_ms);

        loop {
            let attempt = self
                .http
                .post(&url)
                .json(&serde_json::json!({ "ping": true }))
                .send()
                .await;

            if let Ok(resp) = attempt {
                if resp.status().is_success() {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(OrchestratorError::StartupTimeout);
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Seed the last-access map at boot from a set of already-running
    /// workers (used by [`reconcile_at_startup`]).
    pub(crate) fn adopt(&self, name: &str) {
        self.touch(name);
        self.lockers.entry(name.to_string()).or_insert_with(|| Arc::new(Locker::new()));
        info!(container = %name, "adopted running container at startup");
    }

    pub(crate) fn product_label(&self) -> &str {
        &self.config.docker.product_label
    }

    /// Snapshot of `(name, age)` pairs, used by the reaper.
    pub(crate) fn last_access_snapshot(&self) -> Vec<(String, Instant)> {
        self.last_access.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    pub(crate) async fn reap(&self, name: &str, id: &str) {
        if let Err(e) = self.driver.stop(id).await {
            warn!(container = %name, error = %e, "reaper: stop failed, attempting remove anyway");
        }
        if let Err(e) = self.driver.remove(id, true).await {
            warn!(container = %name, error = %e, "reaper: remove failed");
            return;
        }
        self.last_access.remove(name);
        self.lockers.remove(name);
        info!(container = %name, "reaped idle container");
    }
}

fn function_labels(function_name: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert("faasd.function".to_string(), function_name.to_string());
    labels
}

fn map_driver_error(e: crate::driver::DriverError) -> OrchestratorError {
    match e {
        crate::driver::DriverError::ImageNotFound(img) => OrchestratorError::ImageNotFound(img),
        crate::driver::DriverError::NameConflict(name) => OrchestratorError::NameConflict(name),
        crate::driver::DriverError::Engine(err) => OrchestratorError::Docker(err),
    }
}
