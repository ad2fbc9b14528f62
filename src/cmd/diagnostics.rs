//! Diagnostics subcommand — Docker connectivity, socket path, and
//! label-filtered container count (SPEC_FULL.md §5). Mirrors the teacher's
//! `cmd/diagnostics.rs`, scaled down to what an Orchestrator operator
//! actually needs to sanity-check: is the engine reachable, which socket
//! did we pick, how many of our own containers currently exist.

use anyhow::Result;

use crate::config::OrchestratorConfiguration;
use crate::driver::ContainerDriver;

pub async fn run(config: &OrchestratorConfiguration) -> Result<()> {
    println!("faasd orchestrator diagnostics");
    println!("==============================\n");

    println!("Docker:");
    println!("  socket: {}", config.docker.socket);
    println!("  network: {}", config.docker.network);
    println!("  max_concurrent_ops: {}", config.docker.max_concurrent_ops);
    println!("  product_label: {}", config.docker.product_label);

    match ContainerDriver::connect(
        &config.docker.socket,
        config.docker.network.clone(),
        config.docker.max_concurrent_ops,
        &config.docker.product_label,
    ) {
        Ok(driver) => match driver.ping().await {
            Ok(()) => {
                println!("  connectivity: ok");
                match driver.list(&[config.docker.product_label.clone()]).await {
                    Ok(workers) => println!("  managed containers: {}", workers.len()),
                    Err(e) => println!("  managed containers: error listing ({e})"),
                }
            }
            Err(e) => println!("  connectivity: FAILED ({e})"),
        },
        Err(e) => println!("  connectivity: FAILED to connect ({e})"),
    }

    println!("\nReaper: interval={}s idle_timeout={}s", config.reaper.interval_seconds, config.reaper.idle_timeout_seconds);
    println!(
        "Readiness: probe_interval={}ms timeout={}s",
        config.readiness.probe_interval_ms, config.readiness.timeout_seconds
    );

    Ok(())
}
