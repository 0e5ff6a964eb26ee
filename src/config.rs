use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings of one remote database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Handshake budget; a slower target counts as unreachable.
    pub connect_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// ### 修改记录 (2026-03-04)
/// - 原因: 重放周期与监控周期需要解耦
/// - 目的: 分别配置 Worker 与 Monitor 的节奏
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub retry_interval_minutes: u64,
    pub monitor_interval_secs: u64,
    /// Skip replays judged superseded by a continuously healthy peer.
    pub staleness_guard: bool,
    /// Field names that mark a statement as timestamped.
    pub timestamp_markers: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry_interval_minutes: 20,
            monitor_interval_secs: 30,
            staleness_guard: true,
            timestamp_markers: vec![
                "updated_at".to_string(),
                "modified_at".to_string(),
                "last_modified".to_string(),
                "updated_on".to_string(),
            ],
        }
    }
}

impl WorkerConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_minutes.saturating_mul(60))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite file of the durable local store.
    pub local_path: PathBuf,
    pub primary: RemoteConfig,
    pub secondary: RemoteConfig,
    pub worker: WorkerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("local_store.db"),
            primary: RemoteConfig::default(),
            secondary: RemoteConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn load_from_file(path: &Path) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("read {}: {}", path.display(), e)))?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `SYNC_LOCAL_PATH`, `SYNC_PRIMARY_HOST`, `SYNC_PRIMARY_PORT`, ... and
    /// `SYNC_RETRY_INTERVAL_MINUTES` / `SYNC_MONITOR_INTERVAL_SECS`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SyncConfig::default();
        if let Some(path) = lookup("SYNC_LOCAL_PATH") {
            config.local_path = PathBuf::from(path);
        }
        apply_remote_env(&lookup, "SYNC_PRIMARY", &mut config.primary)?;
        apply_remote_env(&lookup, "SYNC_SECONDARY", &mut config.secondary)?;
        if let Some(v) = lookup("SYNC_RETRY_INTERVAL_MINUTES") {
            config.worker.retry_interval_minutes = parse_num(&v, "SYNC_RETRY_INTERVAL_MINUTES")?;
        }
        if let Some(v) = lookup("SYNC_MONITOR_INTERVAL_SECS") {
            config.worker.monitor_interval_secs = parse_num(&v, "SYNC_MONITOR_INTERVAL_SECS")?;
        }
        if let Some(v) = lookup("SYNC_STALENESS_GUARD") {
            config.worker.staleness_guard = !matches!(v.as_str(), "0" | "false" | "off");
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.worker.retry_interval_minutes == 0 {
            return Err(SyncError::Config(
                "retry_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.worker.retry_interval_minutes.checked_mul(60).is_none() {
            return Err(SyncError::Config(
                "retry_interval_minutes is out of range".to_string(),
            ));
        }
        if self.worker.monitor_interval_secs == 0 {
            return Err(SyncError::Config(
                "monitor_interval_secs must be at least 1".to_string(),
            ));
        }
        for (name, remote) in [("primary", &self.primary), ("secondary", &self.secondary)] {
            if remote.connect_timeout_ms == 0 {
                return Err(SyncError::Config(format!(
                    "{} connect_timeout_ms must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn apply_remote_env<F>(lookup: &F, prefix: &str, remote: &mut RemoteConfig) -> SyncResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(&format!("{}_HOST", prefix)) {
        remote.host = v;
    }
    if let Some(v) = lookup(&format!("{}_PORT", prefix)) {
        remote.port = parse_num(&v, &format!("{}_PORT", prefix))?;
    }
    if let Some(v) = lookup(&format!("{}_USER", prefix)) {
        remote.user = v;
    }
    if let Some(v) = lookup(&format!("{}_PASSWORD", prefix)) {
        remote.password = v;
    }
    if let Some(v) = lookup(&format!("{}_DATABASE", prefix)) {
        remote.database = v;
    }
    if let Some(v) = lookup(&format!("{}_CONNECT_TIMEOUT_MS", prefix)) {
        remote.connect_timeout_ms = parse_num(&v, &format!("{}_CONNECT_TIMEOUT_MS", prefix))?;
    }
    Ok(())
}

fn parse_num<T: std::str::FromStr>(value: &str, key: &str) -> SyncResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{} is not a number: {:?}", key, value)))
}
