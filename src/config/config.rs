//! Configuration structures and loading
//!
//! Each binary has its own configuration root (`GatewayConfiguration`,
//! `OrchestratorConfiguration`), loaded from a TOML file with
//! `#[serde(default = "...")]` per field, following the teacher's
//! `config.rs` convention of never requiring a field that has a sane
//! default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

fn load_toml<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {path}"))?;
    toml::from_str(&content).with_context(|| format!("failed to parse config file: {path}"))
}

/// Gateway daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfiguration {
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub api: ApiConfiguration,

    pub auth: AuthConfiguration,

    #[serde(default)]
    pub orchestrator: OrchestratorRemoteConfiguration,

    #[serde(default)]
    pub registry: RegistryConfiguration,

    #[serde(default)]
    pub invocation: InvocationConfiguration,

    #[serde(default)]
    pub breaker: BreakerConfiguration,

    #[serde(default)]
    pub janitor: JanitorConfiguration,
}

impl GatewayConfiguration {
    pub fn load(path: &str) -> Result<Self> {
        load_toml(path)
    }
}

/// Orchestrator daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfiguration {
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_orchestrator_api")]
    pub api: ApiConfiguration,

    #[serde(default)]
    pub docker: DockerConfiguration,

    #[serde(default)]
    pub reaper: ReaperConfiguration,

    #[serde(default)]
    pub readiness: ReadinessConfiguration,

    /// Where on a worker the readiness ping is sent; must agree with the
    /// Gateway's own `invocation` section since both address the same
    /// container endpoint.
    #[serde(default)]
    pub invocation: InvocationConfiguration,
}

impl OrchestratorConfiguration {
    pub fn load(path: &str) -> Result<Self> {
        load_toml(path)
    }
}

fn default_orchestrator_api() -> ApiConfiguration {
    ApiConfiguration {
        host: default_api_host(),
        port: default_orchestrator_port(),
    }
}

fn default_orchestrator_port() -> u16 {
    9090
}

/// Bind-address configuration shared by both binaries.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfiguration {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for ApiConfiguration {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_gateway_port() -> u16 {
    8080
}

/// Static credential pair + token signing configuration (spec §4.4.1).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfiguration {
    pub username: String,
    pub password: String,

    /// Symmetric secret used to sign opaque bearer tokens (HS256).
    pub jwt_secret: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,

    #[serde(default = "default_auth_path")]
    pub auth_path: String,
}

fn default_token_ttl() -> i64 {
    3600
}

fn default_auth_path() -> String {
    "/auth".into()
}

/// How the Gateway reaches the Orchestrator's internal HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorRemoteConfiguration {
    #[serde(default = "default_orchestrator_url")]
    pub url: String,

    #[serde(default = "default_orchestrator_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_orchestrator_retries")]
    pub max_retries: u32,
}

impl Default for OrchestratorRemoteConfiguration {
    fn default() -> Self {
        Self {
            url: default_orchestrator_url(),
            timeout_seconds: default_orchestrator_timeout(),
            max_retries: default_orchestrator_retries(),
        }
    }
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:9090".into()
}

fn default_orchestrator_timeout() -> u64 {
    35
}

fn default_orchestrator_retries() -> u32 {
    3
}

/// Paths to the two declarative descriptor files (spec §6.2).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfiguration {
    #[serde(default = "default_routes_file")]
    pub routes_file: PathBuf,

    #[serde(default = "default_functions_file")]
    pub functions_file: PathBuf,

    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

impl Default for RegistryConfiguration {
    fn default() -> Self {
        Self {
            routes_file: default_routes_file(),
            functions_file: default_functions_file(),
            api_prefix: default_api_prefix(),
        }
    }
}

fn default_routes_file() -> PathBuf {
    PathBuf::from("routes.yaml")
}

fn default_functions_file() -> PathBuf {
    PathBuf::from("functions.yaml")
}

fn default_api_prefix() -> String {
    "2015-03-31".into()
}

/// How the Gateway talks to a container's invocation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationConfiguration {
    #[serde(default = "default_invocation_port")]
    pub port: u16,

    #[serde(default = "default_invocation_path")]
    pub path: String,

    #[serde(default = "default_invocation_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_acquire_timeout")]
    pub default_acquire_timeout_seconds: u64,
}

impl Default for InvocationConfiguration {
    fn default() -> Self {
        Self {
            port: default_invocation_port(),
            path: default_invocation_path(),
            timeout_seconds: default_invocation_timeout(),
            default_acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

fn default_invocation_port() -> u16 {
    8081
}

fn default_invocation_path() -> String {
    "/invoke".into()
}

fn default_invocation_timeout() -> u64 {
    30
}

fn default_acquire_timeout() -> u64 {
    10
}

/// Per-function circuit breaker defaults (spec §4.4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfiguration {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
}

impl Default for BreakerConfiguration {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    30
}

/// The Gateway's heartbeat janitor (spec §4.4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct JanitorConfiguration {
    #[serde(default = "default_janitor_interval")]
    pub interval_seconds: u64,
}

impl Default for JanitorConfiguration {
    fn default() -> Self {
        Self {
            interval_seconds: default_janitor_interval(),
        }
    }
}

/// Fixed at 10x the default reaper idle timeout (300s), comfortably above
/// the spec's recommended 3x floor (see the Open Question decision in
/// SPEC_FULL.md §7).
fn default_janitor_interval() -> u64 {
    30
}

/// Docker engine connection + concurrency bound (spec §4.1).
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfiguration {
    #[serde(default = "default_docker_socket")]
    pub socket: String,

    #[serde(default = "default_network_name")]
    pub network: String,

    /// Bounds simultaneous engine calls; sized from CPU count unless
    /// overridden, matching the Container Driver's async-facade contract
    /// (spec §4.1, §5 "Engine calls ... offloaded to a bounded worker pool").
    #[serde(default = "default_max_concurrent_ops")]
    pub max_concurrent_ops: usize,

    #[serde(default = "default_product_label")]
    pub product_label: String,
}

impl Default for DockerConfiguration {
    fn default() -> Self {
        Self {
            socket: default_docker_socket(),
            network: default_network_name(),
            max_concurrent_ops: default_max_concurrent_ops(),
            product_label: default_product_label(),
        }
    }
}

fn default_docker_socket() -> String {
    #[cfg(target_os = "windows")]
    {
        "npipe:////./pipe/docker_engine".into()
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let user_socket = std::path::Path::new(&home).join(".colima/default/docker.sock");
            if user_socket.exists() {
                return format!("unix://{}", user_socket.display());
            }

            let docker_desktop = std::path::Path::new(&home).join(".docker/run/docker.sock");
            if docker_desktop.exists() {
                return format!("unix://{}", docker_desktop.display());
            }
        }

        "/var/run/docker.sock".into()
    }
}

fn default_network_name() -> String {
    "bridge".into()
}

fn default_max_concurrent_ops() -> usize {
    num_cpus::get() * 4
}

fn default_product_label() -> String {
    "created_by=faasd".into()
}

/// Idle reaper cadence and threshold (spec §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfiguration {
    #[serde(default = "default_reaper_interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_reaper_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl Default for ReaperConfiguration {
    fn default() -> Self {
        Self {
            interval_seconds: default_reaper_interval(),
            idle_timeout_seconds: default_reaper_idle_timeout(),
        }
    }
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_reaper_idle_timeout() -> u64 {
    300
}

/// Readiness probe cadence (spec §4.2 "poll every 500ms").
#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessConfiguration {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default = "default_readiness_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ReadinessConfiguration {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            timeout_seconds: default_readiness_timeout(),
        }
    }
}

fn default_probe_interval_ms() -> u64 {
    500
}

fn default_readiness_timeout() -> u64 {
    30
}
