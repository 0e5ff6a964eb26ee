//! Public entry point wiring the local store, queue, supervisor, coordinator
//! and both background loops together.

use crate::config::SyncConfig;
use crate::coordinator::ReplicationCoordinator;
use crate::engine::RemoteConnector;
use crate::error::{SyncError, SyncResult};
use crate::local_store::LocalStore;
use crate::queue::{QueueEntry, RetryQueue};
use crate::supervisor::{ConnectionSupervisor, RemoteSlot, TargetStatus, Transition};
use crate::types::{Params, Row, Target};
use crate::worker::monitor::ConnectionMonitor;
use crate::worker::policy::{AlwaysReplay, ReplayPolicy, TimestampSniffPolicy};
use crate::worker::retry::{ReplayReport, RetryWorker};
use crate::worker::LoopHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

pub struct SyncEngineBuilder {
    config: SyncConfig,
    primary: Option<Arc<dyn RemoteConnector>>,
    secondary: Option<Arc<dyn RemoteConnector>>,
    policy: Option<Arc<dyn ReplayPolicy>>,
    start_loops: bool,
}

impl SyncEngineBuilder {
    pub fn primary(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.primary = Some(connector);
        self
    }

    pub fn secondary(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.secondary = Some(connector);
        self
    }

    /// Replaces the staleness guard chosen from the configuration.
    pub fn replay_policy(mut self, policy: Arc<dyn ReplayPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Whether `start` launches the monitor and retry worker (default: yes).
    pub fn start_loops(mut self, start: bool) -> Self {
        self.start_loops = start;
        self
    }

    pub async fn start(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;
        let primary = self
            .primary
            .ok_or_else(|| SyncError::Config("primary connector missing".to_string()))?;
        let secondary = self
            .secondary
            .ok_or_else(|| SyncError::Config("secondary connector missing".to_string()))?;

        let local_path = self.config.local_path.clone();
        let local = tokio::task::spawn_blocking(move || LocalStore::open(&local_path))
            .await
            .map_err(|e| SyncError::Local(e.into()))??;
        let queue = Arc::new(RetryQueue::open(local.clone()).await?);

        let supervisor = Arc::new(ConnectionSupervisor::new(vec![
            RemoteSlot::new(
                Target::Primary,
                primary,
                self.config.primary.connect_timeout(),
            ),
            RemoteSlot::new(
                Target::Secondary,
                secondary,
                self.config.secondary.connect_timeout(),
            ),
        ]));
        let coordinator = Arc::new(ReplicationCoordinator::new(
            supervisor.clone(),
            local,
            queue,
        ));

        let policy: Arc<dyn ReplayPolicy> = match self.policy {
            Some(policy) => policy,
            None if self.config.worker.staleness_guard => Arc::new(TimestampSniffPolicy::new(
                &self.config.worker.timestamp_markers,
            )),
            None => Arc::new(AlwaysReplay),
        };
        let worker = Arc::new(RetryWorker::new(coordinator.clone(), policy));

        let engine = SyncEngine {
            coordinator,
            worker,
            config: self.config,
            loops: Mutex::new(Loops::default()),
        };
        if self.start_loops {
            engine.start_monitor().await;
            engine
                .start_worker_with_interval(engine.config.worker.retry_interval())
                .await?;
        }
        tracing::info!(
            pending = engine.pending_count(),
            "sync engine started"
        );
        Ok(engine)
    }
}

#[derive(Default)]
struct Loops {
    worker: Option<LoopHandle>,
    monitor: Option<LoopHandle>,
}

/// Replicating database client used by application code.
///
/// Writes never fail because a remote is down; they degrade to the local
/// store plus retry entries that the worker replays once the remote answers.
pub struct SyncEngine {
    coordinator: Arc<ReplicationCoordinator>,
    worker: Arc<RetryWorker>,
    config: SyncConfig,
    loops: Mutex<Loops>,
}

impl SyncEngine {
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder {
            config,
            primary: None,
            secondary: None,
            policy: None,
            start_loops: true,
        }
    }

    /// Connects both remotes as MySQL servers described by the configuration.
    #[cfg(feature = "mysql")]
    pub async fn start_mysql(config: SyncConfig) -> SyncResult<Self> {
        use crate::engine::mysql::MySqlConnector;
        let primary = Arc::new(MySqlConnector::new(config.primary.clone()));
        let secondary = Arc::new(MySqlConnector::new(config.secondary.clone()));
        Self::builder(config)
            .primary(primary)
            .secondary(secondary)
            .start()
            .await
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<ReplicationCoordinator> {
        &self.coordinator
    }

    pub fn worker(&self) -> &Arc<RetryWorker> {
        &self.worker
    }

    pub async fn insert(&self, query: &str, params: &Params) -> SyncResult<Option<i64>> {
        self.coordinator.insert(query, params).await
    }

    pub async fn update(&self, query: &str, params: &Params) -> SyncResult<()> {
        self.coordinator.update(query, params).await
    }

    pub async fn delete(&self, query: &str, params: &Params) -> SyncResult<()> {
        self.coordinator.delete(query, params).await
    }

    pub async fn select(&self, query: &str, params: &Params) -> SyncResult<Vec<Row>> {
        self.coordinator.select(query, params).await
    }

    pub fn is_primary_active(&self) -> bool {
        self.coordinator.supervisor().is_active(Target::Primary)
    }

    pub fn is_secondary_active(&self) -> bool {
        self.coordinator.supervisor().is_active(Target::Secondary)
    }

    pub fn status(&self) -> Vec<TargetStatus> {
        self.coordinator.supervisor().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.coordinator.supervisor().subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.coordinator.queue().pending_len()
    }

    pub async fn pending_entries(&self) -> SyncResult<Vec<QueueEntry>> {
        self.coordinator.queue().fetch_all().await
    }

    /// Runs a full worker cycle right now, independent of the timer.
    pub async fn sync_now(&self) -> SyncResult<ReplayReport> {
        self.worker.cycle().await
    }

    /// (Re)starts the retry worker with a new interval in minutes.
    pub async fn start_worker(&self, interval_minutes: u64) -> SyncResult<()> {
        let secs = interval_minutes.checked_mul(60).ok_or_else(|| {
            SyncError::Config(format!(
                "worker interval of {} minutes is out of range",
                interval_minutes
            ))
        })?;
        self.start_worker_with_interval(Duration::from_secs(secs))
            .await
    }

    /// Same as [`SyncEngine::start_worker`] with an arbitrary interval.
    ///
    /// The interval must be non-zero and small enough to schedule.
    pub async fn start_worker_with_interval(&self, interval: Duration) -> SyncResult<()> {
        if interval.is_zero() {
            return Err(SyncError::Config(
                "worker interval must be positive".to_string(),
            ));
        }
        if Instant::now().checked_add(interval).is_none() {
            return Err(SyncError::Config(format!(
                "worker interval of {:?} is out of range",
                interval
            )));
        }
        let mut loops = self.loops.lock().await;
        if let Some(previous) = loops.worker.take() {
            previous.stop().await;
        }
        loops.worker = Some(self.worker.clone().spawn(interval));
        Ok(())
    }

    pub async fn stop_worker(&self) {
        let handle = self.loops.lock().await.worker.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub async fn is_worker_running(&self) -> bool {
        matches!(&self.loops.lock().await.worker, Some(handle) if !handle.is_finished())
    }

    pub async fn start_monitor(&self) {
        let mut loops = self.loops.lock().await;
        if let Some(previous) = loops.monitor.take() {
            previous.stop().await;
        }
        let monitor = ConnectionMonitor::new(
            self.coordinator.supervisor().clone(),
            self.config.worker.monitor_interval(),
        );
        loops.monitor = Some(monitor.spawn());
    }

    pub async fn stop_monitor(&self) {
        let handle = self.loops.lock().await.monitor.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// Stops both background loops and waits for them.
    pub async fn shutdown(&self) {
        self.stop_worker().await;
        self.stop_monitor().await;
        tracing::info!(pending = self.pending_count(), "sync engine stopped");
    }
}
