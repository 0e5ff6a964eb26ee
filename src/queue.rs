//! ### 修改记录 (2026-03-04)
//! - 原因: 远端拒绝的写入需要可靠暂存
//! - 目的: 在本地库内持久化重试队列, 进程重启后仍可回放

use crate::error::{SyncError, SyncResult};
use crate::local_store::LocalStore;
use crate::types::{OpKind, Params, Row, SqlValue, Target};
use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Mutex;

const QUEUE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL,
    table_name TEXT,
    payload TEXT NOT NULL,
    target TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_queue_target ON sync_queue(target, id);
";

/// A write rejected by one remote target, waiting for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub kind: OpKind,
    /// Statement text in the portable placeholder style.
    pub operation: String,
    /// Advisory only.
    pub table_name: Option<String>,
    pub params: Params,
    pub target: Target,
    pub created_at: DateTime<Utc>,
}

/// Durable retry queue.
///
/// The `sync_queue` table is the source of truth; `pending` mirrors it so
/// counters and status views do not hit the store. Every store change and
/// the matching mirror update happen under `write_lock`, so a reload never
/// interleaves with an enqueue or delete.
pub struct RetryQueue {
    store: LocalStore,
    pending: Mutex<Vec<QueueEntry>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl RetryQueue {
    /// Creates the queue table when missing and loads persisted entries.
    pub async fn open(store: LocalStore) -> SyncResult<Self> {
        let queue = Self {
            store,
            pending: Mutex::new(Vec::new()),
            write_lock: tokio::sync::Mutex::new(()),
        };
        queue.ensure_schema().await?;
        let restored = queue.fetch_all().await?;
        if !restored.is_empty() {
            tracing::info!(entries = restored.len(), "restored pending retry entries");
        }
        Ok(queue)
    }

    /// Idempotent.
    pub async fn ensure_schema(&self) -> SyncResult<()> {
        self.store
            .execute_batch(QUEUE_SCHEMA)
            .await
            .map_err(as_queue_error)
    }

    /// Persists a failed write for `target` and returns the new entry id.
    pub async fn enqueue(&self, target: Target, query: &str, params: &Params) -> SyncResult<i64> {
        if !target.is_remote() {
            return Err(SyncError::QueuePersist(anyhow!(
                "the local store is never a queue target"
            )));
        }
        let payload = serde_json::to_string(params)?;
        let table_name = extract_table_name(query);
        let _guard = self.write_lock.lock().await;
        let created_at = Utc::now();
        let outcome = self
            .store
            .execute(
                "INSERT INTO sync_queue (operation, table_name, payload, target, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
                &Params::Positional(vec![
                    SqlValue::from(query),
                    SqlValue::from(table_name.clone()),
                    SqlValue::from(payload),
                    SqlValue::from(target.as_str()),
                    SqlValue::from(created_at.to_rfc3339_opts(SecondsFormat::Nanos, true)),
                ]),
            )
            .await
            .map_err(as_queue_error)?;
        let id = outcome
            .last_insert_id
            .ok_or_else(|| SyncError::QueuePersist(anyhow!("queue insert returned no id")))?;

        self.lock_pending().push(QueueEntry {
            id,
            kind: OpKind::from_query(query),
            operation: query.to_string(),
            table_name,
            params: params.clone(),
            target,
            created_at,
        });
        tracing::info!(entry_id = id, remote = %target, "write queued for retry");
        Ok(id)
    }

    /// Reloads every entry from the store, oldest first.
    ///
    /// The persisted copy replaces the in-memory mirror.
    pub async fn fetch_all(&self) -> SyncResult<Vec<QueueEntry>> {
        let _guard = self.write_lock.lock().await;
        let rows = self
            .store
            .query(
                "SELECT id, operation, table_name, payload, target, created_at \
                 FROM sync_queue ORDER BY id",
                &Params::empty(),
            )
            .await
            .map_err(as_queue_error)?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::error!(error = %e, "skipping unreadable queue row"),
            }
        }
        *self.lock_pending() = entries.clone();
        Ok(entries)
    }

    pub async fn fetch_for(&self, target: Target) -> SyncResult<Vec<QueueEntry>> {
        Ok(self
            .fetch_all()
            .await?
            .into_iter()
            .filter(|entry| entry.target == target)
            .collect())
    }

    pub async fn delete(&self, id: i64) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store
            .execute(
                "DELETE FROM sync_queue WHERE id = ?",
                &Params::Positional(vec![SqlValue::Integer(id)]),
            )
            .await
            .map_err(as_queue_error)?;
        self.lock_pending().retain(|entry| entry.id != id);
        Ok(())
    }

    /// Number of entries in the in-memory mirror.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn count_for(&self, target: Target) -> usize {
        self.lock_pending()
            .iter()
            .filter(|entry| entry.target == target)
            .count()
    }

    pub fn pending(&self) -> Vec<QueueEntry> {
        self.lock_pending().clone()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<QueueEntry>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn as_queue_error(e: SyncError) -> SyncError {
    match e {
        SyncError::Local(inner) => SyncError::QueuePersist(inner),
        other => other,
    }
}

fn decode_row(row: &Row) -> SyncResult<QueueEntry> {
    let id = row
        .get_i64("id")
        .ok_or_else(|| SyncError::QueuePersist(anyhow!("queue row without id")))?;
    let operation = row
        .get_str("operation")
        .ok_or_else(|| SyncError::QueuePersist(anyhow!("queue row {} without operation", id)))?
        .to_string();
    let target_raw = row.get_str("target").unwrap_or_default();
    let target = Target::parse(target_raw)
        .filter(Target::is_remote)
        .ok_or_else(|| {
            SyncError::QueuePersist(anyhow!("queue row {} has bad target {:?}", id, target_raw))
        })?;
    let params: Params = serde_json::from_str(row.get_str("payload").unwrap_or("null"))?;
    let created_raw = row.get_str("created_at").unwrap_or_default();
    let created_at = DateTime::parse_from_rfc3339(created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::QueuePersist(anyhow!("queue row {} created_at: {}", id, e)))?;
    Ok(QueueEntry {
        id,
        kind: OpKind::from_query(&operation),
        table_name: row.get_str("table_name").map(str::to_string),
        operation,
        params,
        target,
        created_at,
    })
}

/// Best-effort table name of an INSERT / REPLACE / UPDATE / DELETE statement.
pub fn extract_table_name(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| c.is_whitespace() || c == '(')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
    let idx = match upper.first()?.as_str() {
        "INSERT" | "REPLACE" => upper.iter().position(|t| t == "INTO")? + 1,
        "DELETE" => upper.iter().position(|t| t == "FROM")? + 1,
        "UPDATE" => {
            // UPDATE [OR <conflict>] name
            if upper.get(1).map(String::as_str) == Some("OR") {
                3
            } else {
                1
            }
        }
        _ => return None,
    };
    let name = tokens
        .get(idx)?
        .trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
