//! faasd-gateway entry point
//!
//! Grounded on the teacher's `main.rs` (clap `Cli` with `--config`/`--debug`,
//! `tracing_subscriber::fmt()` init gated on the debug flag) and
//! `cmd/root.rs` (load config, build state, spawn background tasks behind a
//! `CancellationToken`, serve with graceful shutdown on Ctrl+C). Unlike the
//! teacher this binary has no subcommands and no TLS: the teacher's
//! `axum_server` + rustls stack isn't carried here, since this is a local
//! emulator with no external TLS-terminating surface (see DESIGN.md).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use faasd::config::GatewayConfiguration;
use faasd::gateway::{self, AppState};
use faasd::registry::Registry;

#[derive(Parser)]
#[command(name = "faasd-gateway")]
#[command(about = "Gateway half of the faasd local FaaS emulator")]
#[command(version)]
struct Cli {
    /// Path to the Gateway's TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON instead of the default human-readable format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("faasd_gateway={log_level},faasd={log_level}").into());

    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("starting faasd-gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfiguration::load(&cli.config)
        .with_context(|| format!("failed to load gateway config from {}", cli.config))?;
    let config = Arc::new(config);

    info!(host = %config.api.host, port = config.api.port, "configuration loaded");

    let registry = Registry::load(&config.registry.routes_file, &config.registry.functions_file)
        .context("failed to load route/function registry")?;
    let registry = Arc::new(registry);

    let pools = Arc::new(gateway::pool::PoolRegistry::new());
    let breakers = Arc::new(gateway::breaker::BreakerRegistry::new(
        config.breaker.failure_threshold,
        std::time::Duration::from_secs(config.breaker.recovery_timeout_seconds),
    ));
    let orchestrator_client = Arc::new(gateway::orchestrator_client::OrchestratorClient::new(
        &config.orchestrator,
    ));
    let container_http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.invocation.timeout_seconds))
        .build()
        .context("failed to build container-facing http client")?;

    let state = AppState {
        config: config.clone(),
        registry,
        pools: pools.clone(),
        breakers,
        orchestrator_client: orchestrator_client.clone(),
        container_http,
    };

    let app = gateway::build_router(state);

    let shutdown_token = CancellationToken::new();

    let janitor_pools = pools.clone();
    let janitor_orchestrator = orchestrator_client.clone();
    let janitor_interval = config.janitor.interval_seconds;
    let janitor_token = shutdown_token.clone();
    tokio::spawn(async move {
        gateway::run_janitor(janitor_pools, janitor_orchestrator, janitor_interval, janitor_token).await;
    });
    info!(interval_seconds = config.janitor.interval_seconds, "started heartbeat janitor");

    let bind_addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .context("invalid bind address")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(%bind_addr, "gateway listening");

    let shutdown_signal_token = shutdown_token.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
        }
        warn!("received shutdown signal, stopping gateway");
        shutdown_signal_token.cancel();
    };

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("gateway server error")?;

    info!("gateway stopped");
    Ok(())
}
