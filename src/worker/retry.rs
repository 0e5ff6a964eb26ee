//! ### 修改记录 (2026-03-05)
//! - 原因: 远端恢复后需要自动补齐积压写入
//! - 目的: 定时与恢复事件双触发回放重试队列

use crate::coordinator::ReplicationCoordinator;
use crate::error::SyncResult;
use crate::queue::QueueEntry;
use crate::types::Target;
use crate::worker::policy::{ReplayContext, ReplayDecision, ReplayPolicy};
use crate::worker::LoopHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub skipped_stale: usize,
    pub kept_unreachable: usize,
    pub kept_failed: usize,
}

impl ReplayReport {
    pub fn kept(&self) -> usize {
        self.kept_unreachable + self.kept_failed
    }
}

pub struct RetryWorker {
    coordinator: Arc<ReplicationCoordinator>,
    policy: Arc<dyn ReplayPolicy>,
    /// One replay pass at a time, whoever triggers it.
    replay_lock: Mutex<()>,
}

impl RetryWorker {
    pub fn new(coordinator: Arc<ReplicationCoordinator>, policy: Arc<dyn ReplayPolicy>) -> Self {
        Self {
            coordinator,
            policy,
            replay_lock: Mutex::new(()),
        }
    }

    /// Timer cycle: refresh both health flags, then replay.
    pub async fn cycle(&self) -> SyncResult<ReplayReport> {
        self.coordinator.supervisor().ping_all().await;
        self.run_once().await
    }

    /// Replays every queued entry whose target is reachable.
    ///
    /// Unreachable targets keep their entries; a statement that fails again
    /// stays queued for the next pass.
    pub async fn run_once(&self) -> SyncResult<ReplayReport> {
        let _guard = self.replay_lock.lock().await;
        let queue = self.coordinator.queue();
        let supervisor = self.coordinator.supervisor();
        let entries = queue.fetch_all().await?;
        let mut report = ReplayReport::default();
        if entries.is_empty() {
            return Ok(report);
        }

        let mut reachable: HashMap<Target, bool> = HashMap::new();
        for entry in entries {
            let up = match reachable.get(&entry.target) {
                Some(up) => *up,
                None => {
                    let up = supervisor.ping(entry.target).await;
                    reachable.insert(entry.target, up);
                    up
                }
            };
            if !up {
                report.kept_unreachable += 1;
                continue;
            }

            let ctx = ReplayContext {
                entry: &entry,
                peers_continuously_up: self.peers_continuously_up(&entry),
            };
            match self.policy.decide(ctx) {
                ReplayDecision::SkipStale => {
                    queue.delete(entry.id).await?;
                    info!(
                        entry_id = entry.id,
                        remote = %entry.target,
                        "queued write superseded by healthy peer, dropped without replay"
                    );
                    report.skipped_stale += 1;
                }
                ReplayDecision::Replay => {
                    match self
                        .coordinator
                        .execute_on(entry.target, &entry.operation, &entry.params)
                        .await
                    {
                        Ok(_) => {
                            queue.delete(entry.id).await?;
                            debug!(entry_id = entry.id, remote = %entry.target, "queued write replayed");
                            report.replayed += 1;
                        }
                        Err(e) => {
                            warn!(
                                entry_id = entry.id,
                                remote = %entry.target,
                                retryable = e.is_retryable(),
                                error = %e,
                                "replay failed, entry kept"
                            );
                            if e.is_retryable() {
                                reachable.insert(entry.target, false);
                            }
                            report.kept_failed += 1;
                        }
                    }
                }
            }
        }

        info!(
            replayed = report.replayed,
            skipped_stale = report.skipped_stale,
            kept = report.kept(),
            "replay pass finished"
        );
        Ok(report)
    }

    fn peers_continuously_up(&self, entry: &QueueEntry) -> bool {
        let supervisor = self.coordinator.supervisor();
        let peers: Vec<Target> = supervisor
            .targets()
            .into_iter()
            .filter(|t| *t != entry.target)
            .collect();
        !peers.is_empty()
            && peers
                .iter()
                .all(|peer| supervisor.continuously_up_since(*peer, entry.created_at))
    }

    /// Starts the background loop.
    ///
    /// Wakes every `interval` for a full cycle, and immediately whenever a
    /// target recovers (Down -> Up).
    pub fn spawn(self: Arc<Self>, interval: Duration) -> LoopHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut events = self.coordinator.supervisor().subscribe();
        let worker = self;
        let join = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "retry worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        worker.log_pass(worker.cycle().await);
                        drain(&mut events);
                    }
                    event = events.recv() => match event {
                        Ok(transition) if transition.is_recovery() => {
                            info!(remote = %transition.target, "target recovered, replaying queue");
                            worker.log_pass(worker.run_once().await);
                            drain(&mut events);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "retry worker lagged behind health events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            info!("retry worker stopped");
        });
        LoopHandle::new("retry-worker", shutdown_tx, join)
    }

    fn log_pass(&self, result: SyncResult<ReplayReport>) {
        if let Err(e) = result {
            error!(error = %e, "replay pass aborted");
        }
    }
}

/// Drops health events produced while a pass was running; the pass already saw them.
fn drain(events: &mut broadcast::Receiver<crate::supervisor::Transition>) {
    loop {
        match events.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}
