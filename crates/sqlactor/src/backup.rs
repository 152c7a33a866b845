// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online backup between connections, or into a file.
//!
//! Uses rusqlite's Backup API. For a connection-to-connection copy the target
//! thread lends its `rusqlite::Connection` to the source thread for the length
//! of the copy and blocks until it comes back.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rusqlite::backup::{Backup, StepResult};
use sqlactor_core::{Result, SqlActorError};
use tracing::{debug, warn};

use crate::actor::Worker;
use crate::connection::Connection;

/// Pages left and total pages after a backup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    pub remaining: i32,
    pub page_count: i32,
}

type ProgressFn = Box<dyn FnMut(BackupProgress) + Send>;

/// How a backup is stepped.
pub struct BackupOptions {
    pages: i32,
    sleep: Duration,
    lend_timeout: Duration,
    progress: Option<ProgressFn>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            pages: -1,
            sleep: Duration::from_millis(250),
            lend_timeout: Duration::from_secs(30),
            progress: None,
        }
    }
}

impl fmt::Debug for BackupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupOptions")
            .field("pages", &self.pages)
            .field("sleep", &self.sleep)
            .field("lend_timeout", &self.lend_timeout)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BackupOptions {
    /// Pages copied per step. Zero or negative copies everything in one step.
    pub fn pages(mut self, pages: i32) -> Self {
        self.pages = pages;
        self
    }

    /// Pause after a step that found the source busy or locked.
    pub fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// How long the source waits for the target connection to become available.
    pub fn lend_timeout(mut self, timeout: Duration) -> Self {
        self.lend_timeout = timeout;
        self
    }

    /// Called after every step.
    pub fn progress(mut self, f: impl FnMut(BackupProgress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }
}

fn copy(
    src: &rusqlite::Connection,
    dst: &mut rusqlite::Connection,
    options: &mut BackupOptions,
) -> Result<()> {
    let backup = Backup::new(src, dst)?;
    let pages = if options.pages <= 0 { -1 } else { options.pages };
    loop {
        let step = backup.step(pages)?;
        if let Some(report) = options.progress.as_mut() {
            let p = backup.progress();
            report(BackupProgress {
                remaining: p.remaining,
                page_count: p.pagecount,
            });
        }
        match step {
            StepResult::Done => return Ok(()),
            StepResult::More => {}
            StepResult::Busy | StepResult::Locked => thread::sleep(options.sleep),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}

impl Connection {
    /// Copy this database into `target`, another open connection.
    ///
    /// Both connections stay usable afterwards; operations queued on `target`
    /// while the copy runs wait for it to finish.
    pub async fn backup(&self, target: &Connection, options: BackupOptions) -> Result<()> {
        if self.same_connection(target) {
            return Err(SqlActorError::Programming(
                "target cannot be the same connection instance".into(),
            ));
        }
        let (lend_tx, lend_rx) = mpsc::channel::<rusqlite::Connection>();
        let (return_tx, return_rx) = mpsc::channel::<rusqlite::Connection>();
        let lend_timeout = options.lend_timeout;
        let mut options = options;

        let copied = self.actor().submit("backup", move |worker: &mut Worker| {
            let mut dst = lend_rx.recv_timeout(lend_timeout).map_err(|_| {
                SqlActorError::Operational {
                    message: "backup target did not become available".into(),
                    source: None,
                }
            })?;
            let outcome = match worker.conn() {
                Ok(src) => panic::catch_unwind(AssertUnwindSafe(|| copy(src, &mut dst, &mut options)))
                    .unwrap_or_else(|_| Err(SqlActorError::Panicked("backup step panicked".into()))),
                Err(err) => Err(err),
            };
            if return_tx.send(dst).is_err() {
                warn!("backup target went away before its connection was returned");
            }
            outcome
        })?;

        let lent = target.actor().submit("backup.lend", move |worker: &mut Worker| {
            let conn = worker.lend()?;
            if let Err(mpsc::SendError(conn)) = lend_tx.send(conn) {
                worker.restore(conn);
                return Err(SqlActorError::Closed);
            }
            match return_rx.recv() {
                Ok(conn) => {
                    worker.restore(conn);
                    Ok(())
                }
                Err(_) => {
                    worker.finish();
                    Err(SqlActorError::Operational {
                        message: "connection lost during backup".into(),
                        source: None,
                    })
                }
            }
        });
        let lent = match lent {
            Ok(lent) => lent,
            // The source op sees the lend channel close and fails fast.
            Err(err) => {
                let _ = copied.wait().await;
                return Err(err);
            }
        };

        let (copied, lent) = tokio::join!(copied.wait(), lent.wait());
        copied?;
        lent?;
        debug!(
            source = %self.database().display(),
            target = %target.database().display(),
            "backup complete"
        );
        Ok(())
    }

    /// Copy this database into a file at `path`, creating it if needed.
    pub async fn backup_to_path(&self, path: impl AsRef<Path>, options: BackupOptions) -> Result<()> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut options = options;
        self.actor()
            .call("backup_to_path", move |worker: &mut Worker| {
                let mut dst = rusqlite::Connection::open(&path)?;
                copy(worker.conn()?, &mut dst, &mut options)?;
                dst.close().map_err(|(_, err)| SqlActorError::from(err))?;
                debug!(path = %path.display(), "backup written");
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect;
    use std::sync::{Arc, Mutex};

    async fn source() -> Connection {
        let conn = connect(":memory:").await.unwrap();
        conn.execute_script(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT);
             INSERT INTO test VALUES (1, 'hello');
             INSERT INTO test VALUES (2, 'world');",
        )
        .await
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn backup_into_other_connection() {
        let src = source().await;
        let dst = connect(":memory:").await.unwrap();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        src.backup(
            &dst,
            BackupOptions::default().pages(1).progress(move |p| sink.lock().unwrap().push(p)),
        )
        .await
        .unwrap();

        let rows = dst
            .execute_fetchall("SELECT value FROM test ORDER BY id", ())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get::<String>(0).unwrap(), "world");

        let reports = reports.lock().unwrap();
        assert!(!reports.is_empty());
        assert_eq!(reports.last().unwrap().remaining, 0);
    }

    #[tokio::test]
    async fn backup_into_itself_is_rejected() {
        let src = source().await;
        let err = src
            .backup(&src.clone(), BackupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SqlActorError::Programming(_)));
    }

    #[tokio::test]
    async fn backup_into_closed_target_fails_cleanly() {
        let src = source().await;
        let dst = connect(":memory:").await.unwrap();
        dst.close().await.unwrap();
        let err = src.backup(&dst, BackupOptions::default()).await.unwrap_err();
        assert!(err.is_closed());
        // The source is still usable.
        assert_eq!(src.execute_fetchall("SELECT 1", ()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backup_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.db");
        let src = source().await;
        src.backup_to_path(&path, BackupOptions::default())
            .await
            .unwrap();

        let copy = rusqlite::Connection::open(&path).unwrap();
        let count: i64 = copy
            .query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
