//! Remote target plumbing: a connector opens short-lived sessions, a session
//! executes statements. Connections are never pooled; every operation opens a
//! fresh session and closes it right after use.

use crate::dialect::Dialect;
use crate::types::{ExecOutcome, Params, Row};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Placeholder dialect statements must be translated into.
    fn dialect(&self) -> Dialect;

    /// Human-readable endpoint for logs (never includes the password).
    fn describe(&self) -> String;

    /// Performs a real handshake. Callers bound this with the connect timeout.
    async fn connect(&self) -> Result<Box<dyn RemoteSession>>;
}

#[async_trait]
pub trait RemoteSession: Send {
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ExecOutcome>;
    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>>;
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(feature = "mysql")]
pub mod mysql;
pub mod sqlite;
