//! ### 修改记录 (2026-03-04)
//! - 原因: 部署需要通过文件或环境变量配置两个远端
//! - 目的: 验证默认值、覆盖与校验

use failover_sync::{SyncConfig, SyncError};
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn defaults_match_documented_values() {
    let config = SyncConfig::default();
    assert_eq!(config.worker.retry_interval(), Duration::from_secs(20 * 60));
    assert_eq!(config.worker.monitor_interval(), Duration::from_secs(30));
    assert!(config.worker.staleness_guard);
    assert!(config
        .worker
        .timestamp_markers
        .iter()
        .any(|m| m == "updated_at"));
    assert_eq!(config.primary.port, 3306);
    assert_eq!(config.primary.connect_timeout(), Duration::from_secs(5));
    config.validate().unwrap();
}

#[test]
fn lookup_overrides_defaults() {
    let vars: HashMap<&str, &str> = [
        ("SYNC_LOCAL_PATH", "/var/lib/app/local.db"),
        ("SYNC_PRIMARY_HOST", "db1.internal"),
        ("SYNC_PRIMARY_PORT", "3307"),
        ("SYNC_SECONDARY_HOST", "db2.internal"),
        ("SYNC_SECONDARY_USER", "replica"),
        ("SYNC_SECONDARY_CONNECT_TIMEOUT_MS", "1500"),
        ("SYNC_RETRY_INTERVAL_MINUTES", "5"),
        ("SYNC_STALENESS_GUARD", "off"),
    ]
    .into_iter()
    .collect();
    let config = SyncConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

    assert_eq!(config.local_path.to_str(), Some("/var/lib/app/local.db"));
    assert_eq!(config.primary.host, "db1.internal");
    assert_eq!(config.primary.port, 3307);
    assert_eq!(config.secondary.user, "replica");
    assert_eq!(config.secondary.connect_timeout_ms, 1500);
    assert_eq!(config.worker.retry_interval_minutes, 5);
    assert_eq!(config.worker.monitor_interval_secs, 30);
    assert!(!config.worker.staleness_guard);
}

#[test]
fn lookup_rejects_bad_numbers_and_zero_intervals() {
    let err = SyncConfig::from_lookup(|key| {
        (key == "SYNC_PRIMARY_PORT").then(|| "not-a-port".to_string())
    })
    .unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));

    let err = SyncConfig::from_lookup(|key| {
        (key == "SYNC_MONITOR_INTERVAL_SECS").then(|| "0".to_string())
    })
    .unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));

    let err = SyncConfig::from_lookup(|key| {
        (key == "SYNC_RETRY_INTERVAL_MINUTES").then(|| u64::MAX.to_string())
    })
    .unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

/// ### 修改记录 (2026-03-04)
/// - 原因: 文件配置允许只写需要覆盖的字段
/// - 目的: 验证缺省字段回落到默认值
#[test]
fn partial_json_file_fills_in_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.json");
    std::fs::write(
        &path,
        r#"{
            "local_path": "store.db",
            "primary": { "host": "10.0.0.1", "database": "app" },
            "worker": { "retry_interval_minutes": 2 }
        }"#,
    )
    .unwrap();

    let config = SyncConfig::load_from_file(&path).unwrap();
    assert_eq!(config.primary.host, "10.0.0.1");
    assert_eq!(config.primary.port, 3306);
    assert_eq!(config.primary.database, "app");
    assert_eq!(config.secondary, SyncConfig::default().secondary);
    assert_eq!(config.worker.retry_interval_minutes, 2);
    assert_eq!(config.worker.monitor_interval_secs, 30);

    std::fs::write(&path, r#"{ "secondary": { "connect_timeout_ms": 0 } }"#).unwrap();
    assert!(SyncConfig::load_from_file(&path).is_err());
    assert!(SyncConfig::load_from_file(&dir.path().join("missing.json")).is_err());
}
