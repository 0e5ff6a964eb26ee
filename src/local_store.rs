//! ### 修改记录 (2026-03-04)
//! - 原因: 需要一个始终可用的本地持久化库
//! - 目的: 镜像所有成功写入并承载重试队列表

use crate::actor::DbHandle;
use crate::dialect::Dialect;
use crate::error::{SyncError, SyncResult};
use crate::types::{ExecOutcome, Params, Row};
use std::path::Path;
use std::time::Duration;

/// Durable local store.
///
/// Wraps the SQLite actor. Queries arrive here already translated into the
/// SQLite dialect; [`LocalStore::dialect`] tells the caller which one that is.
#[derive(Clone)]
pub struct LocalStore {
    handle: DbHandle,
}

impl LocalStore {
    /// Opens (or creates) the store file.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let handle = DbHandle::spawn(path.to_string_lossy().to_string(), Duration::from_secs(5))
            .map_err(SyncError::Local)?;
        tracing::info!(path = %path.display(), "local store opened");
        Ok(Self { handle })
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    pub fn path(&self) -> &str {
        self.handle.label()
    }

    pub async fn execute(&self, sql: &str, params: &Params) -> SyncResult<ExecOutcome> {
        self.handle
            .execute(sql.to_string(), params.clone())
            .await
            .map_err(SyncError::Local)
    }

    pub async fn query(&self, sql: &str, params: &Params) -> SyncResult<Vec<Row>> {
        self.handle
            .query(sql.to_string(), params.clone())
            .await
            .map_err(SyncError::Local)
    }

    /// Runs several `;`-separated statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> SyncResult<()> {
        self.handle
            .execute_batch(sql.to_string())
            .await
            .map_err(SyncError::Local)
    }

    pub async fn check_health(&self) -> SyncResult<()> {
        self.handle.check_health().await.map_err(|e| {
            tracing::error!(path = %self.path(), error = %e, "local store health check failed");
            SyncError::ActorGone(self.path().to_string())
        })
    }
}
