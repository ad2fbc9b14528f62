//! faasd-orchestrator entry point
//!
//! Grounded on the teacher's `main.rs` (clap `Cli` + subcommand dispatch)
//! and `cmd/root.rs` (load config, build state, spawn background tasks
//! behind a `CancellationToken`, serve with graceful shutdown). Runs
//! startup reconciliation before accepting traffic (spec §4.2) and spawns
//! the idle reaper alongside the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use faasd::cmd::{self, Commands};
use faasd::config::OrchestratorConfiguration;
use faasd::driver::ContainerDriver;
use faasd::orchestrator::{self, server, Orchestrator};

#[derive(Parser)]
#[command(name = "faasd-orchestrator")]
#[command(about = "Orchestrator half of the faasd local FaaS emulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the Orchestrator's TOML configuration file
    #[arg(short, long, default_value = "orchestrator.toml")]
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
        .unwrap_or_else(|_| format!("faasd_orchestrator={log_level},faasd={log_level}").into());

    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("starting faasd-orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let config = OrchestratorConfiguration::load(&cli.config)
        .with_context(|| format!("failed to load orchestrator config from {}", cli.config))?;

    if let Some(Commands::Diagnostics) = cli.command {
        return cmd::diagnostics::run(&config).await;
    }

    run_daemon(config).await
}

async fn run_daemon(config: OrchestratorConfiguration) -> Result<()> {
    info!(host = %config.api.host, port = config.api.port, socket = %config.docker.socket, "configuration loaded");

    let driver = ContainerDriver::connect(
        &config.docker.socket,
        config.docker.network.clone(),
        config.docker.max_concurrent_ops,
        &config.docker.product_label,
    )
    .context("failed to connect to the container engine")?;

    let orchestrator = Arc::new(Orchestrator::new(driver, config.clone()));

    info!("reconciling container state at startup");
    orchestrator::reconcile_at_startup(&orchestrator)
        .await
        .context("startup reconciliation failed")?;

    let state = server::AppState { orchestrator: orchestrator.clone() };
    let app = server::build_router(state);

    let shutdown_token = CancellationToken::new();

    let reaper_orchestrator = orchestrator.clone();
    let reaper_token = shutdown_token.clone();
    tokio::spawn(async move {
        orchestrator::run_reaper(reaper_orchestrator, reaper_token).await;
    });
    info!(interval_seconds = config.reaper.interval_seconds, "started idle reaper");

    let bind_addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .context("invalid bind address")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(%bind_addr, "orchestrator listening");

    let shutdown_signal_token = shutdown_token.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl-c handler");
        }
        warn!("received shutdown signal, stopping orchestrator");
        shutdown_signal_token.cancel();
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("orchestrator server error")?;

    info!("orchestrator stopped");
    Ok(())
}
