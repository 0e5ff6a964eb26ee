use crate::types::{ExecOutcome, OpKind, Params, Row, SqlValue};
use anyhow::{anyhow, Result};
use rusqlite::types::{ToSql, Value};
use rusqlite::Connection;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Database Actor
///
/// Owns one SQLite connection on a dedicated thread.
///
/// Thread Safety:
/// This struct is NOT thread-safe and is designed to live on a single thread.
/// All interactions must go through the `DbHandle` via message passing, which
/// also serializes every access to the file.
pub struct DbActor {
    /// The raw SQLite connection. `rusqlite::Connection` is `!Sync`.
    conn: Connection,
    /// Label used in logs and errors (file path).
    label: String,
}

/// Message types for the Actor
///
/// Each variant carries a `oneshot::Sender` to return the result.
pub enum DbMessage {
    /// Execute one write statement with bound parameters.
    Execute {
        sql: String,
        params: Params,
        resp: oneshot::Sender<Result<ExecOutcome>>,
    },
    /// Run a statement and collect all rows.
    Query {
        sql: String,
        params: Params,
        resp: oneshot::Sender<Result<Vec<Row>>>,
    },
    /// ### 修改记录 (2026-03-04)
    /// - 原因: 建表语句需要一次性执行多条
    /// - 目的: 供队列表初始化复用
    ExecuteBatch {
        sql: String,
        resp: oneshot::Sender<Result<()>>,
    },
    /// Check if the actor is alive and the connection answers.
    CheckHealth { resp: oneshot::Sender<Result<()>> },
}

/// Handle to the Database Actor
///
/// `Clone` and `Send`, so it can be shared across Tokio tasks.
#[derive(Clone)]
pub struct DbHandle {
    /// Channel to send messages to the actor thread.
    sender: mpsc::Sender<DbMessage>,
    label: String,
}

impl DbHandle {
    /// Spawns the database actor in a dedicated background thread.
    ///
    /// SQLite calls block, so they must not run on a Tokio worker thread.
    /// The open result is reported back before this returns.
    pub fn spawn(path: String, busy_timeout: Duration) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<DbMessage>(64);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let label = path.clone();

        thread::Builder::new()
            .name(format!("sqlite-actor:{}", path))
            .spawn(move || {
                let conn = match Connection::open(&path) {
                    Ok(conn) => conn,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("open {} failed: {}", path, e)));
                        return;
                    }
                };
                if let Err(e) = conn.busy_timeout(busy_timeout) {
                    let _ = ready_tx.send(Err(anyhow!(e)));
                    return;
                }
                // journal_mode answers with a row, so it goes through query_row
                let _ = conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()));
                let mut actor = DbActor {
                    conn,
                    label: path,
                };
                let _ = ready_tx.send(Ok(()));

                // Sequential message loop; ends when every handle is dropped.
                while let Some(msg) = rx.blocking_recv() {
                    actor.handle_message(msg);
                }
                tracing::debug!(db = %actor.label, "sqlite actor stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("sqlite actor for {} exited during startup", label))??;

        Ok(Self { sender: tx, label })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    // --- Public Async Methods ---
    // These methods wrap the message passing boilerplate.

    pub async fn execute(&self, sql: String, params: Params) -> Result<ExecOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DbMessage::Execute {
                sql,
                params,
                resp: tx,
            })
            .await
            .map_err(|_| anyhow!("Actor died"))?;
        rx.await?
    }

    pub async fn query(&self, sql: String, params: Params) -> Result<Vec<Row>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DbMessage::Query {
                sql,
                params,
                resp: tx,
            })
            .await
            .map_err(|_| anyhow!("Actor died"))?;
        rx.await?
    }

    pub async fn execute_batch(&self, sql: String) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DbMessage::ExecuteBatch { sql, resp: tx })
            .await
            .map_err(|_| anyhow!("Actor died"))?;
        rx.await?
    }

    pub async fn check_health(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DbMessage::CheckHealth { resp: tx })
            .await
            .map_err(|_| anyhow!("Actor died"))?;
        rx.await?
    }
}

impl DbActor {
    /// The core message handler.
    /// Runs on the dedicated thread and executes operations sequentially.
    fn handle_message(&mut self, msg: DbMessage) {
        match msg {
            DbMessage::Execute { sql, params, resp } => {
                let res = self.execute(&sql, &params);
                if let Err(e) = &res {
                    tracing::debug!(db = %self.label, error = %e, "sqlite execute failed");
                }
                let _ = resp.send(res);
            }
            DbMessage::Query { sql, params, resp } => {
                let _ = resp.send(self.query(&sql, &params));
            }
            DbMessage::ExecuteBatch { sql, resp } => {
                let res = self.conn.execute_batch(&sql).map_err(|e| anyhow!(e));
                let _ = resp.send(res);
            }
            DbMessage::CheckHealth { resp } => {
                let res = self
                    .conn
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map(|_| ())
                    .map_err(|e| anyhow!(e));
                let _ = resp.send(res);
            }
        }
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<ExecOutcome> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows_affected = match params {
            Params::Positional(values) => {
                stmt.execute(rusqlite::params_from_iter(values.iter().map(to_value)))?
            }
            Params::Named(values) => {
                let bound = named_values(values);
                let refs: Vec<(&str, &dyn ToSql)> = bound
                    .iter()
                    .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
                    .collect();
                stmt.execute(refs.as_slice())?
            }
        };
        drop(stmt);
        let last_insert_id = if OpKind::from_query(sql).wants_generated_id() && rows_affected > 0 {
            Some(self.conn.last_insert_rowid())
        } else {
            None
        };
        Ok(ExecOutcome {
            rows_affected: rows_affected as u64,
            last_insert_id,
        })
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut out = Vec::new();
        let mut rows = match params {
            Params::Positional(values) => {
                stmt.query(rusqlite::params_from_iter(values.iter().map(to_value)))?
            }
            Params::Named(values) => {
                let bound = named_values(values);
                let refs: Vec<(&str, &dyn ToSql)> = bound
                    .iter()
                    .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
                    .collect();
                stmt.query(refs.as_slice())?
            }
        };
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(from_value(row.get::<_, Value>(idx)?));
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }
}

fn named_values(values: &std::collections::BTreeMap<String, SqlValue>) -> Vec<(String, Value)> {
    values
        .iter()
        .map(|(k, v)| {
            let key = if k.starts_with(':') || k.starts_with('@') || k.starts_with('$') {
                k.clone()
            } else {
                format!(":{}", k)
            };
            (key, to_value(v))
        })
        .collect()
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

fn from_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(v),
        Value::Real(v) => SqlValue::Real(v),
        Value::Text(v) => SqlValue::Text(v),
        Value::Blob(v) => SqlValue::Blob(v),
    }
}
