use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::SnapshotStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that prunes expired entries from a [`SnapshotStore`].
pub struct SnapshotSweeper {
    store: Arc<dyn SnapshotStore>,
    interval: Duration,
}

impl SnapshotSweeper {
    pub fn new(store: Arc<dyn SnapshotStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Sweeps every `interval` until `shutdown` turns true.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting snapshot sweeper");

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Snapshot sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn sweep(&self) {
        match self.store.prune().await {
            Ok(0) => debug!("Sweep found nothing expired"),
            Ok(removed) => info!(removed, "Pruned expired snapshots"),
            Err(e) => warn!(error = %e, "Failed to prune snapshots"),
        }
    }
}
