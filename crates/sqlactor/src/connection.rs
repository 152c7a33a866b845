// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async connection handle.
//!
//! Every method packages its work as an operation, queues it for the
//! connection thread and suspends until the result comes back. Clones share
//! one thread; the thread releases the database when the last clone is
//! dropped or [`Connection::close`] is called.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sqlactor_core::{IsolationLevel, Params, Result, Row, SqlActorError, TextFactory};
use tracing::debug;

use crate::actor::{Actor, ActorState, Worker};
use crate::cursor::Cursor;
use crate::options::ConnectOptions;

struct Inner {
    actor: Actor,
    iter_chunk_size: AtomicUsize,
}

/// An open database connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("database", &self.inner.actor.database())
            .field("state", &self.state())
            .finish()
    }
}

/// Open `database` with default options.
pub async fn connect(database: impl AsRef<Path>) -> Result<Connection> {
    Connection::open(ConnectOptions::new(database)).await
}

impl Connection {
    /// Start building connection options for `database`.
    pub fn builder(database: impl AsRef<Path>) -> ConnectOptions {
        ConnectOptions::new(database)
    }

    /// Spawn the connection thread and open the database on it.
    ///
    /// Open failures are returned here; the thread has already exited by then.
    pub async fn open(options: ConnectOptions) -> Result<Self> {
        options.validate()?;
        let chunk = options.iter_chunk_size;
        let (actor, connected) = Actor::spawn(options)?;
        connected.wait().await?;
        debug!(database = %actor.database().display(), "connection open");
        Ok(Self {
            inner: Arc::new(Inner {
                actor,
                iter_chunk_size: AtomicUsize::new(chunk),
            }),
        })
    }

    pub(crate) fn actor(&self) -> &Actor {
        &self.inner.actor
    }

    pub(crate) fn same_connection(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> ActorState {
        self.inner.actor.state()
    }

    pub fn database(&self) -> &Path {
        self.inner.actor.database()
    }

    /// Run `f` against the underlying `rusqlite::Connection` on the connection thread.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner
            .actor
            .call("call", move |worker: &mut Worker| f(worker.conn()?))
            .await
    }

    /// Create a cursor with no statement executed yet.
    pub async fn cursor(&self) -> Result<Cursor> {
        let conn = self.clone();
        self.inner
            .actor
            .call("cursor", move |worker: &mut Worker| {
                worker.conn()?;
                Ok(Cursor::new(conn, worker.open_cursor(), false))
            })
            .await
    }

    /// Execute one statement and return a cursor over its result.
    ///
    /// The handle is built on the connection thread, so a caller that stops
    /// waiting drops it there and the result set is released.
    pub async fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<Cursor> {
        let (conn, sql, params) = (self.clone(), sql.to_owned(), params.into());
        self.inner
            .actor
            .call("execute", move |worker: &mut Worker| {
                let id = worker.execute_new(&sql, &params)?;
                let buffered = worker.cursor(id).is_ok_and(|state| state.has_rows());
                Ok(Cursor::new(conn, id, buffered))
            })
            .await
    }

    /// Execute one row-less statement per parameter set.
    pub async fn execute_many<I, P>(&self, sql: &str, batches: I) -> Result<Cursor>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let cursor = self.cursor().await?;
        cursor.execute_many(sql, batches).await?;
        Ok(cursor)
    }

    /// Commit any open transaction and run a multi-statement script.
    pub async fn execute_script(&self, script: &str) -> Result<Cursor> {
        let cursor = self.cursor().await?;
        cursor.execute_script(script).await?;
        Ok(cursor)
    }

    /// Execute an insert and read its rowid in the same operation.
    ///
    /// Returns `None` when the statement changed no rows.
    pub async fn execute_insert(&self, sql: &str, params: impl Into<Params>) -> Result<Option<i64>> {
        let sql = sql.to_owned();
        let params = params.into();
        self.inner
            .actor
            .call("execute_insert", move |worker: &mut Worker| {
                let outcome = worker.execute_direct(&sql, &params)?;
                if outcome.rowcount == 0 {
                    return Ok(None);
                }
                Ok(Some(worker.conn()?.last_insert_rowid()))
            })
            .await
    }

    /// Execute a statement and return every row it produced.
    pub async fn execute_fetchall(&self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        let sql = sql.to_owned();
        let params = params.into();
        self.inner
            .actor
            .call("execute_fetchall", move |worker: &mut Worker| {
                Ok(worker.execute_direct(&sql, &params)?.rows.into())
            })
            .await
    }

    pub async fn commit(&self) -> Result<()> {
        self.inner.actor.call("commit", Worker::commit).await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.inner.actor.call("rollback", Worker::rollback).await
    }

    /// True while a transaction is open.
    pub async fn in_transaction(&self) -> Result<bool> {
        self.inner
            .actor
            .call("in_transaction", |worker: &mut Worker| {
                Ok(!worker.conn()?.is_autocommit())
            })
            .await
    }

    /// Rows changed since the connection was opened.
    pub async fn total_changes(&self) -> Result<i64> {
        self.inner
            .actor
            .call("total_changes", |worker: &mut Worker| {
                Ok(worker
                    .conn()?
                    .query_row("SELECT total_changes()", [], |row| row.get(0))?)
            })
            .await
    }

    pub async fn isolation_level(&self) -> Result<IsolationLevel> {
        self.inner
            .actor
            .call("isolation_level", |worker: &mut Worker| Ok(worker.isolation_level))
            .await
    }

    /// Change the implicit transaction mode. Switching to autocommit commits first.
    pub async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.inner
            .actor
            .call("set_isolation_level", move |worker: &mut Worker| {
                worker.set_isolation_level(level)
            })
            .await
    }

    pub async fn text_factory(&self) -> Result<TextFactory> {
        self.inner
            .actor
            .call("text_factory", |worker: &mut Worker| Ok(worker.text_factory))
            .await
    }

    /// Applies to statements executed after this call.
    pub async fn set_text_factory(&self, factory: TextFactory) -> Result<()> {
        self.inner
            .actor
            .call("set_text_factory", move |worker: &mut Worker| {
                worker.text_factory = factory;
                Ok(())
            })
            .await
    }

    pub fn iter_chunk_size(&self) -> usize {
        self.inner.iter_chunk_size.load(Ordering::Relaxed)
    }

    /// Rows fetched per batch by cursors created after this call. Clamped to at least 1.
    pub fn set_iter_chunk_size(&self, rows: usize) {
        self.inner
            .iter_chunk_size
            .store(rows.max(1), Ordering::Relaxed);
    }

    /// Abort the statement currently running on the connection thread.
    ///
    /// Not queued: it takes effect immediately, even while other operations wait.
    pub fn interrupt(&self) -> Result<()> {
        if self.state() == ActorState::Closed {
            return Err(SqlActorError::Closed);
        }
        match self.inner.actor.interrupt_handle() {
            Some(handle) => {
                handle.interrupt();
                Ok(())
            }
            None => Err(SqlActorError::Closed),
        }
    }

    /// Close the database after all previously queued operations have run.
    pub async fn close(&self) -> Result<()> {
        self.inner.actor.close().await
    }

    /// Request shutdown without waiting; the thread closes the database once idle.
    pub fn stop(&self) {
        self.inner.actor.stop();
    }

    /// Run `f` with this connection, then close it whatever `f` returned.
    pub async fn scope<F, Fut, T>(self, f: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = f(self.clone()).await;
        let closed = self.close().await;
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), _) => Err(err),
        }
    }
}
