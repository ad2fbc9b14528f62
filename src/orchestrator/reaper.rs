//! Idle reaper (spec §4.2)
//!
//! Background loop, default interval 60s: any container whose last-access
//! is older than `reaper.idle_timeout_seconds` is stopped then removed.
//! Grounded on the teacher's `cmd/root.rs` periodic-status-sync task
//! (`tokio::time::interval` + `CancellationToken`, spawned once at startup).

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Orchestrator;
use crate::driver::ContainerStatus;

pub async fn run_reaper(orchestrator: std::sync::Arc<Orchestrator>, shutdown: CancellationToken) {
    let interval = Duration::from_secs(orchestrator.config().reaper.interval_seconds);
    let idle_timeout = Duration::from_secs(orchestrator.config().reaper.idle_timeout_seconds);
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // skip the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("idle reaper stopped");
                return;
            }
            _ = ticker.tick() => {
                sweep(&orchestrator, idle_timeout).await;
            }
        }
    }
}

async fn sweep(orchestrator: &Orchestrator, idle_timeout: Duration) {
    let now = Instant::now();
    let snapshot = orchestrator.last_access_snapshot();
    let mut reaped = 0usize;

    for (name, last_access) in snapshot {
        if now.duration_since(last_access) < idle_timeout {
            continue;
        }

        let inspection = match orchestrator.driver().inspect(&name).await {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "reaper: inspect failed");
                continue;
            }
        };

        if inspection.status == ContainerStatus::Missing {
            continue;
        }

        orchestrator.reap(&name, &inspection.id).await;
        reaped += 1;
    }

    if reaped > 0 {
        debug!(reaped, "idle reaper sweep complete");
    }
}
