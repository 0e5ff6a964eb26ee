use crate::dialect::{self, Dialect};
use crate::error::{SyncError, SyncResult};
use crate::local_store::LocalStore;
use crate::queue::RetryQueue;
use crate::supervisor::ConnectionSupervisor;
use crate::types::{ExecOutcome, Params, Row, Target};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// ReplicationCoordinator: write/read router across the remote targets and
/// the durable local store.
///
/// Key Responsibilities:
/// 1. Fan-out: every write is attempted on each remote in priority order.
/// 2. Mirroring: the local store receives every write exactly once.
/// 3. Queueing: each remote that rejected the write gets one retry entry.
/// 4. Read failover: Primary, then Secondary, then the local store.
///
/// Architecture Note:
/// Remote failures never reach the caller. A connect failure and a statement
/// failure are both logged with their classification, downgrade the target
/// and fall through to the next level. The only error a caller sees is the
/// local store failing while no remote accepted the operation, or the retry
/// queue failing to persist.
pub struct ReplicationCoordinator {
    supervisor: Arc<ConnectionSupervisor>,
    local: LocalStore,
    queue: Arc<RetryQueue>,
}

impl ReplicationCoordinator {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        local: LocalStore,
        queue: Arc<RetryQueue>,
    ) -> Self {
        Self {
            supervisor,
            local,
            queue,
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Inserts a row and returns the id generated by the target that accepted it.
    pub async fn insert(&self, query: &str, params: &Params) -> SyncResult<Option<i64>> {
        let outcome = self.write(query, params).await?;
        Ok(outcome.last_insert_id)
    }

    pub async fn update(&self, query: &str, params: &Params) -> SyncResult<()> {
        self.write(query, params).await.map(|_| ())
    }

    pub async fn delete(&self, query: &str, params: &Params) -> SyncResult<()> {
        self.write(query, params).await.map(|_| ())
    }

    /// Executes one logical write across all targets.
    ///
    /// Steps:
    /// 1. Attempt every remote in priority order; the first success supplies the result.
    /// 2. If any remote succeeded, mirror into the local store (a mirror failure is
    ///    logged, the remote already holds the data).
    /// 3. If none did, the local store executes it and its result is returned.
    /// 4. Queue one retry entry per remote that failed.
    pub async fn write(&self, query: &str, params: &Params) -> SyncResult<ExecOutcome> {
        let write_id = Uuid::new_v4();
        if !dialect::arity_matches(query, params) {
            warn!(%write_id, params = params.len(), "placeholder count does not match parameters");
        }

        let mut accepted: Option<(Target, ExecOutcome)> = None;
        let mut failed = Vec::new();
        for target in self.supervisor.targets() {
            match self.execute_on(target, query, params).await {
                Ok(outcome) => {
                    debug!(%write_id, remote = %target, rows = outcome.rows_affected, "remote write applied");
                    if accepted.is_none() {
                        accepted = Some((target, outcome));
                    }
                }
                Err(e) => {
                    warn!(
                        %write_id,
                        remote = %target,
                        retryable = e.is_retryable(),
                        error = %e,
                        "remote write failed, falling through"
                    );
                    failed.push(target);
                }
            }
        }

        let local_sql = self.local.dialect().translate(query);
        let outcome = match accepted {
            Some((target, outcome)) => {
                if let Err(e) = self.local.execute(&local_sql, params).await {
                    error!(%write_id, accepted_by = %target, error = %e, "local mirror failed");
                }
                outcome
            }
            None => {
                let outcome = self.local.execute(&local_sql, params).await?;
                info!(%write_id, "no remote reachable, write kept locally");
                outcome
            }
        };

        for target in failed {
            self.queue.enqueue(target, query, params).await?;
        }
        Ok(outcome)
    }

    /// Reads from the first target that answers: Primary, Secondary, then local.
    /// Rows come back as returned by that single source.
    pub async fn select(&self, query: &str, params: &Params) -> SyncResult<Vec<Row>> {
        for target in self.supervisor.targets() {
            match self.query_on(target, query, params).await {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    debug!(remote = %target, error = %e, "remote read failed, falling through");
                }
            }
        }
        let local_sql = self.local.dialect().translate(query);
        self.local.query(&local_sql, params).await
    }

    /// Runs one write on one remote over a fresh session.
    ///
    /// A statement failure downgrades the target just like a connect failure.
    pub async fn execute_on(
        &self,
        target: Target,
        query: &str,
        params: &Params,
    ) -> SyncResult<ExecOutcome> {
        let dialect = self.dialect_of(target)?;
        let mut session = self.supervisor.try_connect(target).await?;
        let sql = dialect.translate(query);
        let result = session
            .execute(&sql, params)
            .await
            .map_err(|e| SyncError::Execute {
                target,
                message: e.to_string(),
            });
        if let Err(e) = session.close().await {
            debug!(remote = %target, error = %e, "closing session failed");
        }
        if let Err(e) = &result {
            self.supervisor.mark_down(target, e);
        }
        result
    }

    /// Runs one read on one remote over a fresh session.
    pub async fn query_on(
        &self,
        target: Target,
        query: &str,
        params: &Params,
    ) -> SyncResult<Vec<Row>> {
        let dialect = self.dialect_of(target)?;
        let mut session = self.supervisor.try_connect(target).await?;
        let sql = dialect.translate(query);
        let result = session
            .query(&sql, params)
            .await
            .map_err(|e| SyncError::Execute {
                target,
                message: e.to_string(),
            });
        if let Err(e) = session.close().await {
            debug!(remote = %target, error = %e, "closing session failed");
        }
        if let Err(e) = &result {
            self.supervisor.mark_down(target, e);
        }
        result
    }

    fn dialect_of(&self, target: Target) -> SyncResult<Dialect> {
        self.supervisor
            .dialect(target)
            .ok_or_else(|| SyncError::Connect {
                target,
                message: "target not configured".to_string(),
            })
    }
}
