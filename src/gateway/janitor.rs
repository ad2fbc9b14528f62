//! Heartbeat janitor (spec §4.4.5)
//!
//! Background loop, default interval 30s: collect `function -> [names]`
//! across every pool and POST one heartbeat per non-empty function.
//! Structurally mirrors the Orchestrator's `reaper.rs` (interval +
//! `CancellationToken`, grounded on the teacher's `cmd/root.rs`
//! periodic-task idiom).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::orchestrator_client::OrchestratorClient;
use super::pool::PoolRegistry;

pub async fn run_janitor(
    pools: std::sync::Arc<PoolRegistry>,
    orchestrator: std::sync::Arc<OrchestratorClient>,
    interval_seconds: u64,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
    ticker.tick().await; // skip the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("heartbeat janitor stopped");
                return;
            }
            _ = ticker.tick() => {
                sweep(&pools, &orchestrator).await;
            }
        }
    }
}

async fn sweep(pools: &PoolRegistry, orchestrator: &OrchestratorClient) {
    let by_function = pools.all_names_by_function();

    for (function_name, names) in by_function {
        if let Err(e) = orchestrator.heartbeat(&function_name, &names).await {
            warn!(function = %function_name, error = %e, "heartbeat failed");
        }
    }
}
