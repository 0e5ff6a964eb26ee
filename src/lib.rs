//! Write replication across two remote databases with a durable local store
//! and an offline retry queue.

pub mod actor;
pub mod config;
pub mod coordinator;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod local_store;
pub mod queue;
pub mod supervisor;
pub mod sync_engine;
pub mod types;
pub mod worker;

pub use config::{RemoteConfig, SyncConfig, WorkerConfig};
pub use error::{SyncError, SyncResult};
pub use sync_engine::{SyncEngine, SyncEngineBuilder};
pub use types::{OpKind, Params, Row, SqlValue, Target};
