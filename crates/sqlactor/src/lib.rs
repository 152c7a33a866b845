// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async SQLite connections driven by a dedicated thread per connection.
//!
//! A [`Connection`] owns nothing but a queue handle: the real
//! `rusqlite::Connection` lives on its own OS thread, which runs queued
//! operations one at a time in submission order. Callers on any task
//! await the results.
//!
//! ```no_run
//! # async fn demo() -> sqlactor::Result<()> {
//! use futures::TryStreamExt;
//! use sqlactor::params;
//!
//! let conn = sqlactor::connect("app.db").await?;
//! conn.execute_script("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, v TEXT)").await?;
//! conn.execute("INSERT INTO t (v) VALUES (?)", params!["hello"]).await?;
//! conn.commit().await?;
//!
//! let cursor = conn.execute("SELECT id, v FROM t", ()).await?;
//! let rows: Vec<_> = cursor.rows().try_collect().await?;
//! conn.close().await?;
//! # Ok(()) }
//! ```

mod actor;
mod admin;
pub mod backup;
pub mod connection;
pub mod cursor;
mod dump;
mod exec;
pub mod options;
pub mod queue;

pub use actor::ActorState;
pub use backup::{BackupOptions, BackupProgress};
pub use connection::{Connection, connect};
pub use cursor::Cursor;
pub use options::ConnectOptions;
pub use sqlactor_core::{
    FromValue, IsolationLevel, Params, Result, Row, SqlActorError, TextFactory, Value,
    named_params, params,
};
