// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end behaviour of connections and cursors across tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::TryStreamExt;
use sqlactor::{
    ActorState, ConnectOptions, Connection, IsolationLevel, SqlActorError, TextFactory, Value,
    connect, params,
};

async fn memory() -> Connection {
    connect(":memory:").await.expect("open in-memory database")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_from_ten_tasks() {
    let conn = memory().await;
    conn.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY, n INTEGER)")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for n in 0..10_i64 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.execute("INSERT INTO t (n) VALUES (?)", params![n])
                .await
                .map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    conn.commit().await.unwrap();

    let rows = conn
        .execute_fetchall("SELECT n FROM t ORDER BY n", ())
        .await
        .unwrap();
    let seen: Vec<i64> = rows.iter().map(|r| r.get(0).unwrap()).collect();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn operations_from_one_task_run_in_order() {
    let conn = memory().await;
    conn.execute_script("CREATE TABLE log (step INTEGER)").await.unwrap();

    // join_all polls (and so submits) in list order.
    let pending = (0..50_i64).map(|step| {
        let conn = conn.clone();
        async move { conn.execute("INSERT INTO log VALUES (?)", params![step]).await }
    });
    for outcome in futures::future::join_all(pending).await {
        outcome.unwrap();
    }

    let rows = conn
        .execute_fetchall("SELECT step FROM log ORDER BY rowid", ())
        .await
        .unwrap();
    let steps: Vec<i64> = rows.iter().map(|r| r.get(0).unwrap()).collect();
    assert_eq!(steps, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn constraint_failure_is_isolated() {
    let conn = memory().await;
    conn.execute_script(
        "CREATE TABLE u (id INTEGER PRIMARY KEY, email TEXT UNIQUE);
         INSERT INTO u (email) VALUES ('a@example.com');",
    )
    .await
    .unwrap();

    let err = conn
        .execute("INSERT INTO u (email) VALUES (?)", params!["a@example.com"])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlActorError::Integrity { .. }), "{err:?}");
    assert!(err.is_constraint_violation());

    let rows = conn.execute_fetchall("SELECT count(*) FROM u", ()).await.unwrap();
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 1);
}

#[tokio::test]
async fn syntax_error_is_operational() {
    let conn = memory().await;
    let err = conn.execute("SELEC 1", ()).await.unwrap_err();
    assert!(matches!(err, SqlActorError::Operational { .. }), "{err:?}");
    conn.execute("SELECT 1", ()).await.unwrap();
}

#[tokio::test]
async fn execute_after_close_fails_fast() {
    let conn = memory().await;
    conn.close().await.unwrap();
    assert_eq!(conn.state(), ActorState::Closed);

    let err = tokio::time::timeout(Duration::from_secs(1), conn.execute("SELECT 1", ()))
        .await
        .expect("closed connection must not hang")
        .unwrap_err();
    assert!(err.is_closed());
    assert_eq!(err.to_string(), "connection closed");

    // Closing again is a no-op.
    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_close_returns_only_after_release() {
    let conn = memory().await;
    let slow = conn.clone();
    let pending = tokio::spawn(async move {
        slow.call(|_raw| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let first = conn.clone();
    let second = conn.clone();
    let (a, b) = tokio::join!(
        async move {
            first.close().await.unwrap();
            first.state()
        },
        async move {
            second.close().await.unwrap();
            second.state()
        }
    );
    assert_eq!(a, ActorState::Closed);
    assert_eq!(b, ActorState::Closed);
    pending.await.unwrap().unwrap();
}

#[tokio::test]
async fn work_queued_before_close_still_completes() {
    let conn = memory().await;
    conn.execute_script("CREATE TABLE t (x)").await.unwrap();

    let writer = {
        let conn = conn.clone();
        async move { conn.execute_insert("INSERT INTO t VALUES (1)", ()).await }
    };
    let (inserted, closed) = tokio::join!(writer, conn.close());
    assert_eq!(inserted.unwrap(), Some(1));
    closed.unwrap();
}

#[tokio::test]
async fn cursor_of_closed_connection_fails() {
    let conn = memory().await;
    let cursor = conn.execute("SELECT 1", ()).await.unwrap();
    conn.close().await.unwrap();
    assert!(cursor.fetch_all().await.unwrap_err().is_closed());
}

#[tokio::test]
async fn stream_yields_k_rows_for_any_chunk_size() {
    let conn = Connection::builder(":memory:")
        .iter_chunk_size(4)
        .connect()
        .await
        .unwrap();
    conn.execute_script("CREATE TABLE k (v INTEGER)").await.unwrap();
    conn.execute_many("INSERT INTO k VALUES (?)", (0..10_i64).map(|v| params![v]))
        .await
        .unwrap();

    for chunk in [1, 3, 4, 10, 11] {
        conn.set_iter_chunk_size(chunk);
        let cursor = conn.execute("SELECT v FROM k ORDER BY v", ()).await.unwrap();
        let rows: Vec<_> = cursor.rows().try_collect().await.unwrap();
        assert_eq!(rows.len(), 10, "chunk size {chunk}");
        assert_eq!(rows[9][0], Value::Integer(9));
    }
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

    #[test]
    fn stream_row_count_matches_table(rows in 0i64..40, chunk in 1usize..12) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let fetched = runtime.block_on(async {
            let conn = memory().await;
            conn.execute_script("CREATE TABLE k (v INTEGER)").await.unwrap();
            conn.execute_many("INSERT INTO k VALUES (?)", (0..rows).map(|v| params![v]))
                .await
                .unwrap();
            conn.set_iter_chunk_size(chunk);
            let cursor = conn.execute("SELECT v FROM k ORDER BY v", ()).await.unwrap();
            let values: Vec<_> = cursor.rows().try_collect().await.unwrap();
            conn.close().await.unwrap();
            values
        });
        proptest::prop_assert_eq!(fetched.len() as i64, rows);
        for (i, row) in fetched.iter().enumerate() {
            proptest::prop_assert_eq!(&row[0], &Value::Integer(i as i64));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn execute_insert_is_atomic_under_contention() {
    let conn = memory().await;
    conn.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY, who INTEGER)")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for who in 0..20_i64 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            let id = conn
                .execute_insert("INSERT INTO t (who) VALUES (?)", params![who])
                .await
                .unwrap()
                .unwrap();
            (who, id)
        }));
    }
    for task in tasks {
        let (who, id) = task.await.unwrap();
        let rows = conn
            .execute_fetchall("SELECT who FROM t WHERE id = ?", params![id])
            .await
            .unwrap();
        assert_eq!(rows[0].get::<i64>(0).unwrap(), who);
    }
}

#[tokio::test]
async fn rowcount_and_lastrowid_follow_statements() {
    let conn = memory().await;
    conn.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY, v)").await.unwrap();
    let cursor = conn.cursor().await.unwrap();

    cursor
        .execute_many("INSERT INTO t (v) VALUES (?)", [params![1], params![2], params![3]])
        .await
        .unwrap();
    assert_eq!(cursor.rowcount().await.unwrap(), 3);

    cursor.execute("INSERT INTO t (v) VALUES (4)", ()).await.unwrap();
    assert_eq!(cursor.lastrowid().await.unwrap(), Some(4));

    cursor.execute("UPDATE t SET v = 0 WHERE id < 3", ()).await.unwrap();
    assert_eq!(cursor.rowcount().await.unwrap(), 2);
    assert_eq!(cursor.lastrowid().await.unwrap(), Some(4));

    cursor.execute("SELECT * FROM t", ()).await.unwrap();
    assert_eq!(cursor.rowcount().await.unwrap(), -1);
    assert_eq!(
        cursor.description().await.unwrap(),
        Some(vec!["id".to_string(), "v".to_string()])
    );
}

#[tokio::test]
async fn transactions_commit_and_roll_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tx.db");
    let conn = connect(&path).await.unwrap();
    conn.execute_script("CREATE TABLE t (x)").await.unwrap();

    assert!(!conn.in_transaction().await.unwrap());
    conn.execute("INSERT INTO t VALUES (1)", ()).await.unwrap();
    assert!(conn.in_transaction().await.unwrap());
    conn.rollback().await.unwrap();
    assert!(!conn.in_transaction().await.unwrap());

    conn.execute("INSERT INTO t VALUES (2)", ()).await.unwrap();
    conn.commit().await.unwrap();
    conn.close().await.unwrap();

    let reopened = connect(&path).await.unwrap();
    let rows = reopened.execute_fetchall("SELECT x FROM t", ()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 2);
    assert_eq!(reopened.total_changes().await.unwrap(), 0);
}

#[tokio::test]
async fn autocommit_isolation_never_opens_transactions() {
    let conn = Connection::builder(":memory:")
        .isolation_level(IsolationLevel::Autocommit)
        .connect()
        .await
        .unwrap();
    conn.execute_script("CREATE TABLE t (x)").await.unwrap();
    conn.execute("INSERT INTO t VALUES (1)", ()).await.unwrap();
    assert!(!conn.in_transaction().await.unwrap());
    assert_eq!(conn.total_changes().await.unwrap(), 1);
}

#[tokio::test]
async fn text_factory_applies_to_later_queries() {
    let conn = memory().await;
    let rows = conn.execute_fetchall("SELECT 'abc'", ()).await.unwrap();
    assert_eq!(rows[0][0], Value::Text("abc".into()));

    conn.set_text_factory(TextFactory::Bytes).await.unwrap();
    assert_eq!(conn.text_factory().await.unwrap(), TextFactory::Bytes);
    let rows = conn.execute_fetchall("SELECT 'abc'", ()).await.unwrap();
    assert_eq!(rows[0][0], Value::Blob(b"abc".to_vec()));
}

#[tokio::test]
async fn undecodable_text_fails_instead_of_being_replaced() {
    let conn = memory().await;
    let err = conn
        .execute_fetchall("SELECT CAST(x'ff' AS TEXT)", ())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlActorError::Data(_)), "{err:?}");

    conn.set_text_factory(TextFactory::Bytes).await.unwrap();
    let rows = conn
        .execute_fetchall("SELECT CAST(x'ff' AS TEXT)", ())
        .await
        .unwrap();
    assert_eq!(rows[0][0], Value::Blob(vec![0xff]));
}

#[tokio::test]
async fn call_runs_against_raw_connection() {
    let conn = memory().await;
    let version: String = conn
        .call(|raw| Ok(raw.query_row("SELECT sqlite_version()", [], |r| r.get(0))?))
        .await
        .unwrap();
    assert!(!version.is_empty());
}

#[tokio::test]
async fn panic_in_call_leaves_connection_usable() {
    let conn = memory().await;
    let err = conn
        .call(|_raw| -> sqlactor::Result<()> { panic!("deliberate") })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlActorError::Panicked(_)));
    conn.execute("SELECT 1", ()).await.unwrap();
}

#[tokio::test]
async fn operation_timeout_gives_up_without_cancelling() {
    let conn = Connection::builder(":memory:")
        .operation_timeout(Duration::from_millis(20))
        .connect()
        .await
        .unwrap();
    conn.execute_script("CREATE TABLE t (x)").await.unwrap();

    let err = conn
        .call(|raw| {
            std::thread::sleep(Duration::from_millis(200));
            raw.execute("INSERT INTO t VALUES (1)", [])?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlActorError::Timeout { .. }));

    // The slow operation still runs to completion.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let rows = conn.execute_fetchall("SELECT count(*) FROM t", ()).await.unwrap();
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 1);
}

#[tokio::test]
async fn scope_closes_on_success_and_failure() {
    let conn = memory().await;
    let handle = conn.clone();
    let answer = conn
        .scope(|c| async move {
            let rows = c.execute_fetchall("SELECT 42", ()).await?;
            rows[0].get::<i64>(0)
        })
        .await
        .unwrap();
    assert_eq!(answer, 42);
    assert_eq!(handle.state(), ActorState::Closed);

    let conn = memory().await;
    let handle = conn.clone();
    let err = conn
        .scope(|c| async move { c.execute("NOT SQL", ()).await.map(|_| ()) })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlActorError::Operational { .. }));
    assert_eq!(handle.state(), ActorState::Closed);
}

#[tokio::test]
async fn dropping_every_handle_releases_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drop.db");
    let conn = ConnectOptions::new(&path)
        .poll_interval(Duration::from_millis(5))
        .connect()
        .await
        .unwrap();
    conn.execute_script("CREATE TABLE t (x); INSERT INTO t VALUES (1);")
        .await
        .unwrap();
    // Leaves a write transaction open.
    conn.execute("INSERT INTO t VALUES (2)", ()).await.unwrap();
    drop(conn);

    // The exclusive lock is only granted once the first thread rolled back and let go.
    let other = connect(&path).await.unwrap();
    other.execute_script("BEGIN EXCLUSIVE; COMMIT;").await.unwrap();
    let rows = other.execute_fetchall("SELECT count(*) FROM t", ()).await.unwrap();
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 1);
}

#[tokio::test]
async fn interrupt_aborts_long_query() {
    let conn = memory().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    // Slow every statement down so the interrupt lands mid-query.
    conn.set_progress_handler(1000, move || {
        seen.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(1));
        false
    })
    .await
    .unwrap();

    let runner = conn.clone();
    let query = tokio::spawn(async move {
        runner
            .execute_fetchall(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
                (),
            )
            .await
    });
    while calls.load(Ordering::Relaxed) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    conn.interrupt().unwrap();
    let err = query.await.unwrap().unwrap_err();
    assert!(matches!(err, SqlActorError::Operational { .. }), "{err:?}");
}

#[tokio::test]
async fn trace_callback_is_installed() {
    fn ignore(_sql: &str) {}

    let conn = memory().await;
    conn.set_trace_callback(Some(ignore as fn(&str))).await.unwrap();
    conn.execute("SELECT 1", ()).await.unwrap();
    conn.set_trace_callback(None).await.unwrap();
}

#[tokio::test]
async fn dump_round_trips_through_backup_target() {
    let src = memory().await;
    src.execute_script(
        "CREATE TABLE foo (i INTEGER, k TEXT); INSERT INTO foo VALUES (1, 'hello');",
    )
    .await
    .unwrap();
    let dst = memory().await;
    src.backup(&dst, sqlactor::BackupOptions::default()).await.unwrap();

    let lines = dst.dump().await.unwrap();
    assert!(lines.contains(&r#"INSERT INTO "foo" VALUES(1,'hello');"#.to_string()));
    assert_eq!(lines, src.dump().await.unwrap());
}

#[tokio::test]
async fn missing_directory_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let err = connect(dir.path().join("absent").join("x.db"))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlActorError::Operational { .. }), "{err:?}");
}
