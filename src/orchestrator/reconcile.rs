//! Startup reconciliation (spec §4.2)
//!
//! Executed once at boot: adopt every running labelled container into the
//! last-access map, force-remove every non-running one. Makes an
//! Orchestrator restart safe while requests keep flowing.

use tracing::{info, warn};

use super::Orchestrator;
use crate::driver::ContainerStatus;

pub async fn reconcile_at_startup(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let label = orchestrator.product_label();
    let candidates = orchestrator.driver().list(&[label.to_string()]).await?;

    let mut adopted = 0usize;
    let mut swept = 0usize;

    for worker in candidates {
        let inspection = orchestrator.driver().inspect(&worker.id).await?;
        match inspection.status {
            ContainerStatus::Running => {
                orchestrator.adopt(&worker.name);
                adopted += 1;
            }
            ContainerStatus::Missing => {
                // Vanished between list and inspect; nothing to do.
            }
            _ => {
                if let Err(e) = orchestrator.driver().remove(&worker.id, true).await {
                    warn!(container = %worker.name, error = %e, "zombie sweep: remove failed");
                } else {
                    swept += 1;
                }
            }
        }
    }

    info!(adopted, swept, "startup reconciliation complete");
    Ok(())
}
