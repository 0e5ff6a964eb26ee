//! ### 修改记录 (2026-03-04)
//! - 原因: 连接失败与语句失败需要可区分的类型
//! - 目的: 内部保留分类信息, 对外仍保持吞错回落语义

use crate::types::Target;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Target unreachable or handshake rejected.
    #[error("connect to {target} failed: {message}")]
    Connect { target: Target, message: String },

    /// Handshake did not finish inside the connect timeout.
    #[error("connect to {target} timed out after {timeout_ms} ms")]
    Timeout { target: Target, timeout_ms: u64 },

    /// Connected, but the statement itself failed.
    #[error("execute on {target} failed: {message}")]
    Execute { target: Target, message: String },

    /// The local durable store rejected the operation.
    #[error("local store failure: {0}")]
    Local(anyhow::Error),

    /// A retry queue entry could not be persisted or removed.
    #[error("retry queue persistence failed: {0}")]
    QueuePersist(anyhow::Error),

    /// A persisted payload could not be encoded or decoded.
    #[error("queue payload codec error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The SQLite actor thread is gone.
    #[error("store actor for {0} is not running")]
    ActorGone(String),
}

impl SyncError {
    /// Transient failures that a later replay can be expected to fix.
    ///
    /// Statement errors are not retryable, but the write path still queues
    /// them like connect failures; this is only reported in logs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connect { .. } | SyncError::Timeout { .. } | SyncError::ActorGone(_)
        )
    }

    pub fn target(&self) -> Option<Target> {
        match self {
            SyncError::Connect { target, .. }
            | SyncError::Timeout { target, .. }
            | SyncError::Execute { target, .. } => Some(*target),
            SyncError::Local(_) => Some(Target::Local),
            _ => None,
        }
    }
}
