use crate::supervisor::{ConnectionSupervisor, LinkState};
use crate::worker::LoopHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Observability loop.
///
/// Pings every remote on a short fixed cadence so status accessors stay fresh
/// and logs each state transition, whoever caused it. Never replays.
pub struct ConnectionMonitor {
    supervisor: Arc<ConnectionSupervisor>,
    interval: Duration,
}

impl ConnectionMonitor {
    pub fn new(supervisor: Arc<ConnectionSupervisor>, interval: Duration) -> Self {
        Self {
            supervisor,
            interval,
        }
    }

    /// Starts the loop; the first probe runs immediately.
    pub fn spawn(self) -> LoopHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut events = self.supervisor.subscribe();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "connection monitor started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let results = self.supervisor.ping_all().await;
                        debug!(?results, "connection probe finished");
                    }
                    event = events.recv() => match event {
                        Ok(t) if t.to == LinkState::Up => {
                            info!(remote = %t.target, from = ?t.from, "remote target online");
                        }
                        Ok(t) => {
                            warn!(remote = %t.target, from = ?t.from, "remote target offline");
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "monitor lagged behind health events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            info!("connection monitor stopped");
        });
        LoopHandle::new("connection-monitor", shutdown_tx, join)
    }
}
