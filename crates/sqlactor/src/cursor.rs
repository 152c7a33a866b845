// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async cursor handle.

use std::borrow::Borrow;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::Stream;
use futures::stream;
use sqlactor_core::{Params, Result, Row};

use crate::actor::Worker;
use crate::connection::Connection;
use crate::exec::CursorId;

/// A cursor bound to one connection.
///
/// Results live on the connection thread; `fetch_*` calls and [`Cursor::rows`]
/// pull them over in batches. Dropping an open cursor queues its release.
#[derive(Debug)]
pub struct Cursor {
    conn: Connection,
    id: CursorId,
    closed: AtomicBool,
    /// Whether the connection thread still holds unfetched rows.
    buffered: AtomicBool,
}

impl Cursor {
    pub(crate) fn new(conn: Connection, id: CursorId, buffered: bool) -> Self {
        Self {
            conn,
            id,
            closed: AtomicBool::new(false),
            buffered: AtomicBool::new(buffered),
        }
    }

    fn set_buffered(&self, buffered: bool) {
        self.buffered.store(buffered, Ordering::Release);
    }

    /// The connection this cursor was created from.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<&Self> {
        let (id, sql, params) = (self.id, sql.to_owned(), params.into());
        let buffered = self
            .conn
            .actor()
            .call("cursor.execute", move |worker: &mut Worker| {
                worker.cursor_execute(id, &sql, &params)?;
                Ok(worker.cursor(id)?.has_rows())
            })
            .await?;
        self.set_buffered(buffered);
        Ok(self)
    }

    pub async fn execute_many<I, P>(&self, sql: &str, batches: I) -> Result<&Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let (id, sql) = (self.id, sql.to_owned());
        let batches: Vec<Params> = batches.into_iter().map(Into::into).collect();
        self.conn
            .actor()
            .call("cursor.execute_many", move |worker: &mut Worker| {
                worker.cursor_execute_many(id, &sql, &batches)
            })
            .await?;
        self.set_buffered(false);
        Ok(self)
    }

    pub async fn execute_script(&self, script: &str) -> Result<&Self> {
        let (id, script) = (self.id, script.to_owned());
        self.conn
            .actor()
            .call("cursor.execute_script", move |worker: &mut Worker| {
                worker.cursor_execute_script(id, &script)
            })
            .await?;
        self.set_buffered(false);
        Ok(self)
    }

    pub async fn fetch_one(&self) -> Result<Option<Row>> {
        let id = self.id;
        let (row, buffered) = self
            .conn
            .actor()
            .call("cursor.fetch_one", move |worker: &mut Worker| {
                let state = worker.cursor(id)?;
                Ok((state.fetch_one(), state.has_rows()))
            })
            .await?;
        self.set_buffered(buffered);
        Ok(row)
    }

    /// Up to `n` rows, or `arraysize` rows when `n` is `None`.
    pub async fn fetch_many(&self, n: Option<usize>) -> Result<Vec<Row>> {
        let id = self.id;
        let (rows, buffered) = self
            .conn
            .actor()
            .call("cursor.fetch_many", move |worker: &mut Worker| {
                let state = worker.cursor(id)?;
                Ok((state.fetch(n), state.has_rows()))
            })
            .await?;
        self.set_buffered(buffered);
        Ok(rows)
    }

    pub async fn fetch_all(&self) -> Result<Vec<Row>> {
        let id = self.id;
        let rows = self
            .conn
            .actor()
            .call("cursor.fetch_all", move |worker: &mut Worker| {
                Ok(worker.cursor(id)?.fetch_all())
            })
            .await?;
        self.set_buffered(false);
        Ok(rows)
    }

    /// Rows changed by the last DML statement, or -1.
    pub async fn rowcount(&self) -> Result<i64> {
        let id = self.id;
        self.conn
            .actor()
            .call("cursor.rowcount", move |worker: &mut Worker| {
                Ok(worker.cursor(id)?.rowcount())
            })
            .await
    }

    pub async fn lastrowid(&self) -> Result<Option<i64>> {
        let id = self.id;
        self.conn
            .actor()
            .call("cursor.lastrowid", move |worker: &mut Worker| {
                Ok(worker.cursor(id)?.lastrowid())
            })
            .await
    }

    /// Column names of the current result set.
    pub async fn description(&self) -> Result<Option<Vec<String>>> {
        let id = self.id;
        self.conn
            .actor()
            .call("cursor.description", move |worker: &mut Worker| {
                Ok(worker.cursor(id)?.description())
            })
            .await
    }

    pub async fn arraysize(&self) -> Result<usize> {
        let id = self.id;
        self.conn
            .actor()
            .call("cursor.arraysize", move |worker: &mut Worker| {
                Ok(worker.cursor(id)?.arraysize())
            })
            .await
    }

    pub async fn set_arraysize(&self, size: usize) -> Result<()> {
        let id = self.id;
        self.conn
            .actor()
            .call("cursor.set_arraysize", move |worker: &mut Worker| {
                worker.cursor(id)?.set_arraysize(size);
                Ok(())
            })
            .await
    }

    /// Stream the remaining rows, fetching `iter_chunk_size` at a time.
    pub fn rows(&self) -> impl Stream<Item = Result<Row>> + '_ {
        chunked(self, self.conn.iter_chunk_size())
    }

    /// Like [`rows`](Self::rows), but the stream owns the cursor.
    pub fn into_rows(self) -> impl Stream<Item = Result<Row>> {
        let chunk = self.conn.iter_chunk_size();
        chunked(self, chunk)
    }

    /// Release the result set. Later calls on this cursor fail.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let id = self.id;
        self.conn
            .actor()
            .call("cursor.close", move |worker: &mut Worker| {
                worker.close_cursor(id);
                Ok(())
            })
            .await
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let id = self.id;
            self.conn
                .actor()
                .detach("cursor.drop", move |worker: &mut Worker| {
                    worker.close_cursor(id);
                    Ok(())
                });
        }
    }
}

struct ChunkState<C> {
    cursor: C,
    buffer: std::vec::IntoIter<Row>,
    exhausted: bool,
}

/// One fetch per `chunk` rows; a result of K rows costs exactly ceil(K / chunk) fetches.
fn chunked<C>(cursor: C, chunk: usize) -> impl Stream<Item = Result<Row>>
where
    C: Borrow<Cursor>,
{
    let exhausted = !cursor.borrow().buffered.load(Ordering::Acquire);
    let state = ChunkState {
        cursor,
        buffer: Vec::new().into_iter(),
        exhausted,
    };
    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(row) = state.buffer.next() {
                return Some((Ok(row), state));
            }
            if state.exhausted {
                return None;
            }
            let fetched = state.cursor.borrow().fetch_many(Some(chunk)).await;
            match fetched {
                Ok(batch) => {
                    state.exhausted = !state.cursor.borrow().buffered.load(Ordering::Acquire);
                    state.buffer = batch.into_iter();
                }
                Err(err) => {
                    state.exhausted = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
}
