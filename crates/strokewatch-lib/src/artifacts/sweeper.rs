//! TTL sweeper loop
//!
//! Periodically deletes registered artifacts whose TTL has passed. Scheduled
//! deletions normally get there first; the sweeper catches the ones that were
//! lost or failed.

use super::ArtifactManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ArtifactSweeper {
    manager: Arc<ArtifactManager>,
    interval: Duration,
}

impl ArtifactSweeper {
    pub fn new(manager: Arc<ArtifactManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval: if interval.is_zero() {
                DEFAULT_SWEEP_INTERVAL
            } else {
                interval
            },
        }
    }

    /// Run until a shutdown signal is received
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Starting artifact sweeper");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let manager = Arc::clone(&self.manager);
                    match tokio::task::spawn_blocking(move || manager.sweep_expired()).await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "Swept expired artifacts"),
                        Err(e) => warn!(error = %e, "Artifact sweep task failed"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down artifact sweeper");
                    break;
                }
            }
        }
    }
}
