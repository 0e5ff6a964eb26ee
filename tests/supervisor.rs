//! ### 修改记录 (2026-03-05)
//! - 原因: 健康标志决定回放与状态展示
//! - 目的: 验证探测、超时、状态转换事件与连续在线判断


use chrono::Utc;
use failover_sync::supervisor::{ConnectionSupervisor, LinkState, RemoteSlot};
use failover_sync::{SyncError, Target};
use std::sync::Arc;
use std::time::Duration;
use sync_common::FaultyConnector;
use tempfile::tempdir;

fn supervisor_over(primary: Arc<FaultyConnector>, secondary: Arc<FaultyConnector>) -> ConnectionSupervisor {
    ConnectionSupervisor::new(vec![
        RemoteSlot::new(Target::Primary, primary, Duration::from_millis(300)),
        RemoteSlot::new(Target::Secondary, secondary, Duration::from_millis(300)),
    ])
}

#[tokio::test]
async fn flags_follow_the_latest_probe() {
    let dir = tempdir().unwrap();
    let primary = Arc::new(FaultyConnector::new(&dir.path().join("p.db")));
    let secondary = Arc::new(FaultyConnector::new(&dir.path().join("s.db")));
    let supervisor = supervisor_over(primary.clone(), secondary.clone());

    assert_eq!(supervisor.targets(), Target::REMOTES.to_vec());
    assert!(!supervisor.is_active(Target::Primary));
    assert!(supervisor.is_active(Target::Local));
    assert_eq!(
        supervisor.status(Target::Primary).unwrap().state,
        LinkState::Unknown
    );

    secondary.set_down(true);
    let results = supervisor.ping_all().await;
    assert_eq!(results, vec![(Target::Primary, true), (Target::Secondary, false)]);
    assert!(supervisor.is_active(Target::Primary));
    assert!(!supervisor.is_active(Target::Secondary));
    let secondary_status = supervisor.status(Target::Secondary).unwrap();
    assert!(secondary_status.last_error.is_some());
    assert!(secondary_status.up_since.is_none());

    // ### 修改记录 (2026-03-05)
    // - 原因: 标志不带滞回
    // - 目的: 一次失败即降级, 一次成功即恢复
    primary.set_down(true);
    secondary.set_down(false);
    assert!(!supervisor.ping(Target::Primary).await);
    assert!(supervisor.ping(Target::Secondary).await);
    assert!(!supervisor.is_active(Target::Primary));
    assert!(supervisor.is_active(Target::Secondary));

    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].target, Target::Primary);
    assert!(snapshot[0].endpoint.contains("p.db"));
}

#[tokio::test]
async fn slow_handshake_counts_as_unreachable() {
    let dir = tempdir().unwrap();
    let primary = Arc::new(FaultyConnector::new(&dir.path().join("p.db")));
    let secondary = Arc::new(FaultyConnector::new(&dir.path().join("s.db")));
    let supervisor = supervisor_over(primary.clone(), secondary);

    primary.set_hang(true);
    let started = std::time::Instant::now();
    let err = supervisor.try_connect(Target::Primary).await.err().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, SyncError::Timeout { target: Target::Primary, .. }));
    assert!(err.is_retryable());
    assert!(!supervisor.is_active(Target::Primary));
}

/// ### 修改记录 (2026-03-05)
/// - 原因: Worker 依赖状态转换事件触发回放
/// - 目的: 验证事件只在状态变化时发出一次
#[tokio::test]
async fn transitions_are_edge_triggered() {
    let dir = tempdir().unwrap();
    let primary = Arc::new(FaultyConnector::new(&dir.path().join("p.db")));
    let secondary = Arc::new(FaultyConnector::new(&dir.path().join("s.db")));
    let supervisor = supervisor_over(primary.clone(), secondary);
    let mut events = supervisor.subscribe();

    primary.set_down(true);
    supervisor.ping(Target::Primary).await;
    supervisor.ping(Target::Primary).await;
    primary.set_down(false);
    supervisor.ping(Target::Primary).await;
    supervisor.ping(Target::Primary).await;

    let first = events.try_recv().unwrap();
    assert_eq!((first.from, first.to), (LinkState::Unknown, LinkState::Down));
    assert!(!first.is_recovery());
    let second = events.try_recv().unwrap();
    assert_eq!((second.from, second.to), (LinkState::Down, LinkState::Up));
    assert!(second.is_recovery());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn continuous_uptime_resets_after_an_outage() {
    let dir = tempdir().unwrap();
    let primary = Arc::new(FaultyConnector::new(&dir.path().join("p.db")));
    let secondary = Arc::new(FaultyConnector::new(&dir.path().join("s.db")));
    let supervisor = supervisor_over(primary.clone(), secondary);

    assert!(!supervisor.continuously_up_since(Target::Primary, Utc::now()));
    supervisor.ping(Target::Primary).await;
    let after_first_up = Utc::now();
    supervisor.ping(Target::Primary).await;
    assert!(supervisor.continuously_up_since(Target::Primary, after_first_up));
    let up_since = supervisor.status(Target::Primary).unwrap().up_since.unwrap();
    assert!(up_since <= after_first_up);

    primary.set_down(true);
    supervisor.ping(Target::Primary).await;
    primary.set_down(false);
    supervisor.ping(Target::Primary).await;
    assert!(!supervisor.continuously_up_since(Target::Primary, after_first_up));
    assert!(supervisor.continuously_up_since(Target::Primary, Utc::now()));
}

#[tokio::test]
async fn mark_down_downgrades_an_up_target() {
    let dir = tempdir().unwrap();
    let primary = Arc::new(FaultyConnector::new(&dir.path().join("p.db")));
    let secondary = Arc::new(FaultyConnector::new(&dir.path().join("s.db")));
    let supervisor = supervisor_over(primary, secondary);

    assert!(supervisor.connect(Target::Primary).await.is_some());
    assert!(supervisor.is_active(Target::Primary));
    supervisor.mark_down(
        Target::Primary,
        &SyncError::Execute {
            target: Target::Primary,
            message: "gone away".to_string(),
        },
    );
    assert!(!supervisor.is_active(Target::Primary));
    assert!(supervisor
        .status(Target::Primary)
        .unwrap()
        .last_error
        .unwrap()
        .contains("gone away"));
}
