//! ### 修改记录 (2026-03-05)
//! - 原因: 写入路径需要在任意远端故障组合下保持一致
//! - 目的: 覆盖双活、主库离线、备库离线、全部离线与语句失败各组合


use failover_sync::engine::{RemoteConnector, RemoteSession};
use failover_sync::{sql_params, Params, SqlValue, Target};
use sync_common::{harness, local_count, remote_count, remote_rows};

/// ### 修改记录 (2026-03-05)
/// - 原因: 双远端在线时不应产生任何队列项
/// - 目的: 验证三处各落地一次
#[tokio::test]
async fn write_with_both_remotes_up_lands_everywhere_once() {
    let h = harness().await.unwrap();
    h.engine
        .insert("INSERT INTO t(a) VALUES (%s)", &sql_params![1])
        .await
        .unwrap();

    assert_eq!(remote_count(h.primary.raw(), "t").await.unwrap(), 1);
    assert_eq!(remote_count(h.secondary.raw(), "t").await.unwrap(), 1);
    assert_eq!(local_count(&h.engine, "t").await.unwrap(), 1);
    assert_eq!(h.engine.pending_count(), 0);
    assert!(h.engine.is_primary_active());
    assert!(h.engine.is_secondary_active());
}

#[tokio::test]
async fn primary_down_queues_one_entry_for_primary() {
    let h = harness().await.unwrap();
    h.primary.set_down(true);

    let id = h
        .engine
        .insert("INSERT INTO t(a) VALUES (%s)", &sql_params![1])
        .await
        .unwrap();
    assert_eq!(id, Some(1));

    assert_eq!(remote_count(h.primary.raw(), "t").await.unwrap(), 0);
    assert_eq!(remote_count(h.secondary.raw(), "t").await.unwrap(), 1);
    assert_eq!(local_count(&h.engine, "t").await.unwrap(), 1);
    let entries = h.engine.pending_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, Target::Primary);
    assert_eq!(entries[0].operation, "INSERT INTO t(a) VALUES (%s)");
    assert_eq!(entries[0].params, sql_params![1]);
    assert!(!h.engine.is_primary_active());
    assert!(h.engine.is_secondary_active());
}

/// ### 修改记录 (2026-03-05)
/// - 原因: 全部远端离线时写入仍需成功
/// - 目的: 验证本地承接写入且每个远端各一条队列项
#[tokio::test]
async fn all_remotes_down_write_succeeds_locally() {
    let h = harness().await.unwrap();
    h.primary.set_down(true);
    h.secondary.set_down(true);

    h.engine
        .update("UPDATE t SET a = %s", &sql_params![5])
        .await
        .unwrap();
    h.engine
        .insert("INSERT INTO t(a) VALUES (%s)", &sql_params![9])
        .await
        .unwrap();

    assert_eq!(local_count(&h.engine, "t").await.unwrap(), 1);
    let entries = h.engine.pending_entries().await.unwrap();
    assert_eq!(entries.len(), 4);
    let queue = h.engine.coordinator().queue();
    assert_eq!(queue.count_for(Target::Primary), 2);
    assert_eq!(queue.count_for(Target::Secondary), 2);
    // one entry per failed target, in submission order
    assert_eq!(entries[0].operation, "UPDATE t SET a = %s");
    assert_eq!(entries[2].operation, "INSERT INTO t(a) VALUES (%s)");
}

#[tokio::test]
async fn statement_failure_is_queued_like_an_outage() {
    let h = harness().await.unwrap();
    h.primary.set_fail_execute(true);

    h.engine
        .insert("INSERT INTO t(a) VALUES (%s)", &sql_params![1])
        .await
        .unwrap();

    assert_eq!(remote_count(h.primary.raw(), "t").await.unwrap(), 0);
    assert_eq!(remote_count(h.secondary.raw(), "t").await.unwrap(), 1);
    assert_eq!(h.engine.coordinator().queue().count_for(Target::Primary), 1);
    assert!(!h.engine.is_primary_active());
}

/// ### 修改记录 (2026-03-05)
/// - 原因: 仅当无远端接受且本地也失败时才向调用方报错
/// - 目的: 验证错误传播与不落队列
#[tokio::test]
async fn local_failure_surfaces_only_when_no_remote_accepted() {
    let h = harness().await.unwrap();
    h.primary.set_down(true);
    h.secondary.set_down(true);
    let err = h
        .engine
        .insert("INSERT INTO nowhere(a) VALUES (%s)", &sql_params![1])
        .await
        .unwrap_err();
    assert!(matches!(err, failover_sync::SyncError::Local(_)));
    assert_eq!(h.engine.pending_count(), 0);
}

#[tokio::test]
async fn insert_returns_id_from_accepting_remote() {
    let h = harness().await.unwrap();
    h.engine
        .insert(
            "INSERT INTO items(name, qty) VALUES (%(name)s, %(qty)s)",
            &Params::named([("name", SqlValue::from("bolt")), ("qty", SqlValue::from(10))]),
        )
        .await
        .unwrap();
    let id = h
        .engine
        .insert(
            "INSERT INTO items(name, qty) VALUES (%s, %s)",
            &sql_params!["nut", 20],
        )
        .await
        .unwrap();
    assert_eq!(id, Some(2));

    let rows = remote_rows(h.primary.raw(), "SELECT name, qty FROM items ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rows[0].get_str("name"), Some("bolt"));
    assert_eq!(rows[1].get_i64("qty"), Some(20));

    h.engine
        .delete("DELETE FROM items WHERE name = %s", &sql_params!["bolt"])
        .await
        .unwrap();
    assert_eq!(remote_count(h.secondary.raw(), "items").await.unwrap(), 1);
    assert_eq!(local_count(&h.engine, "items").await.unwrap(), 1);
}

/// ### 修改记录 (2026-03-05)
/// - 原因: 每次操作都重新建立连接
/// - 目的: 验证上一次失败不影响下一次尝试
#[tokio::test]
async fn every_write_retries_the_connection() {
    let h = harness().await.unwrap();
    h.primary.set_down(true);
    h.engine
        .insert("INSERT INTO t(a) VALUES (%s)", &sql_params![1])
        .await
        .unwrap();
    h.primary.set_down(false);
    h.engine
        .insert("INSERT INTO t(a) VALUES (%s)", &sql_params![2])
        .await
        .unwrap();

    assert_eq!(remote_count(h.primary.raw(), "t").await.unwrap(), 1);
    assert!(h.engine.is_primary_active());
    assert_eq!(h.engine.pending_count(), 1);
}

/// ### 修改记录 (2026-03-07)
/// - 原因: 主库在线而备库离线的分支缺少覆盖
/// - 目的: 验证仅为备库生成一条队列项, 返回主库生成的 id
#[tokio::test]
async fn secondary_down_queues_one_entry_for_secondary() {
    let h = harness().await.unwrap();
    // primary's sequence runs ahead so the returned id shows who answered
    let mut session = h.primary.raw().connect().await.unwrap();
    session
        .execute(
            "INSERT INTO items(name, qty) VALUES (?, ?)",
            &sql_params!["seed", 0],
        )
        .await
        .unwrap();
    session.close().await.unwrap();
    h.secondary.set_down(true);

    let id = h
        .engine
        .insert(
            "INSERT INTO items(name, qty) VALUES (%s, %s)",
            &sql_params!["washer", 4],
        )
        .await
        .unwrap();
    assert_eq!(id, Some(2));

    assert_eq!(remote_count(h.primary.raw(), "items").await.unwrap(), 2);
    assert_eq!(remote_count(h.secondary.raw(), "items").await.unwrap(), 0);
    assert_eq!(local_count(&h.engine, "items").await.unwrap(), 1);
    let entries = h.engine.pending_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, Target::Secondary);
    assert_eq!(entries[0].params, sql_params!["washer", 4]);
    assert!(h.engine.is_primary_active());
    assert!(!h.engine.is_secondary_active());
}

#[tokio::test]
async fn secondary_statement_failure_queues_for_secondary() {
    let h = harness().await.unwrap();
    h.secondary.set_fail_execute(true);
    h.engine
        .update("UPDATE t SET a = %s", &sql_params![3])
        .await
        .unwrap();

    let queue = h.engine.coordinator().queue();
    assert_eq!(queue.count_for(Target::Secondary), 1);
    assert_eq!(queue.count_for(Target::Primary), 0);
}

/// ### 修改记录 (2026-03-07)
/// - 原因: LIKE 模式中的 `%s` 曾被改写为占位符, 写入静默落空
/// - 目的: 验证带百分号字面量的语句在所有目标上原样执行
#[tokio::test]
async fn like_pattern_literal_reaches_every_target_unchanged() {
    let h = harness().await.unwrap();
    h.engine
        .insert(
            "INSERT INTO items(name, qty) VALUES (%s, %s)",
            &sql_params!["bigsales", 1],
        )
        .await
        .unwrap();
    h.engine
        .insert(
            "INSERT INTO items(name, qty) VALUES (%s, %s)",
            &sql_params!["returns", 1],
        )
        .await
        .unwrap();

    h.engine
        .update(
            "UPDATE items SET qty = ? WHERE name LIKE '%sales'",
            &sql_params![99],
        )
        .await
        .unwrap();

    let sql = "SELECT qty FROM items ORDER BY id";
    for connector in [h.primary.raw(), h.secondary.raw()] {
        let rows = remote_rows(connector, sql).await.unwrap();
        assert_eq!(rows[0].get_i64("qty"), Some(99));
        assert_eq!(rows[1].get_i64("qty"), Some(1));
    }
    let rows = h.engine.coordinator().local().query(sql, &Params::empty()).await.unwrap();
    assert_eq!(rows[0].get_i64("qty"), Some(99));
    assert_eq!(rows[1].get_i64("qty"), Some(1));
    assert_eq!(h.engine.pending_count(), 0);
}
