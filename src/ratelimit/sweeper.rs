//! Background eviction of expired windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::registry::LimiterRegistry;

/// Periodically sweeps every limiter in a registry.
pub struct Sweeper;

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn(registry: Arc<LimiterRegistry>, every: Duration) -> SweeperHandle {
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(interval_ms = every.as_millis() as u64, "Sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = registry.clock().now();
                        let removed = registry.sweep_all(now);
                        debug!(
                            removed = removed,
                            remaining = registry.counter_count(),
                            "Sweep completed"
                        );
                    }
                    _ = stop.changed() => break,
                }
            }

            info!("Sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}

impl SweeperHandle {
    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
