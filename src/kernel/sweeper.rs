use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::orchestrator::Orchestrator;

/// Periodically expire idle sessions until `shutdown` fires.
pub fn spawn_idle_sweeper(orchestrator: Arc<Orchestrator>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cadence = tokio::time::interval(every);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing can be idle yet.
        cadence.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("idle sweeper stopping");
                    break;
                }
                _ = cadence.tick() => {
                    if let Err(e) = orchestrator.sweep_idle().await {
                        warn!(error = %e, "idle sweep failed, retrying next tick");
                    }
                }
            }
        }
    })
}
