use crate::actor::DbHandle;
use crate::dialect::Dialect;
use crate::engine::{RemoteConnector, RemoteSession};
use crate::types::{ExecOutcome, Params, Row};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// SQLite-backed remote target.
///
/// Useful for single-host deployments and for tests. Every `connect` opens a
/// brand new connection on its own actor thread; `close` drops it.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file. The parent directory must exist;
    ///   a missing directory makes the target unreachable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl RemoteConnector for SqliteConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn describe(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    async fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let path = self.path.to_string_lossy().to_string();
        let busy_timeout = self.busy_timeout;
        // Opening the file blocks; keep it off the async workers.
        let handle =
            tokio::task::spawn_blocking(move || DbHandle::spawn(path, busy_timeout)).await??;
        handle.check_health().await?;
        Ok(Box::new(SqliteSession { handle }))
    }
}

/// One open connection, delegating to the actor.
pub struct SqliteSession {
    handle: DbHandle,
}

#[async_trait]
impl RemoteSession for SqliteSession {
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ExecOutcome> {
        self.handle.execute(sql.to_string(), params.clone()).await
    }

    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        self.handle.query(sql.to_string(), params.clone()).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping the last handle ends the actor loop and closes the file.
        drop(self.handle);
        Ok(())
    }
}
