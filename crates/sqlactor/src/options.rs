// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Options for opening a connection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::OpenFlags;
use sqlactor_config::ConnectionConfig;
use sqlactor_core::{IsolationLevel, Result, SqlActorError, TextFactory};

use crate::connection::Connection;

/// Default number of rows fetched per batch while streaming a cursor.
pub const DEFAULT_ITER_CHUNK_SIZE: usize = 64;

/// Default interval at which an idle connection thread re-checks its state.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How to open a connection and drive its thread.
///
/// Doubles as the connection builder: `ConnectOptions::new(path).iter_chunk_size(16).connect()`.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub(crate) database: PathBuf,
    pub(crate) iter_chunk_size: usize,
    pub(crate) poll_interval: Duration,
    pub(crate) busy_timeout: Duration,
    pub(crate) operation_timeout: Option<Duration>,
    pub(crate) isolation_level: IsolationLevel,
    pub(crate) text_factory: TextFactory,
    pub(crate) read_only: bool,
    pub(crate) uri: bool,
}

impl ConnectOptions {
    pub fn new(database: impl AsRef<Path>) -> Self {
        Self {
            database: database.as_ref().to_path_buf(),
            iter_chunk_size: DEFAULT_ITER_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            operation_timeout: None,
            isolation_level: IsolationLevel::default(),
            text_factory: TextFactory::default(),
            read_only: false,
            uri: false,
        }
    }

    /// Build options from the `[connection]` configuration section.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            database: PathBuf::from(&config.database),
            iter_chunk_size: config.iter_chunk_size,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            operation_timeout: (config.operation_timeout_ms > 0)
                .then(|| Duration::from_millis(config.operation_timeout_ms)),
            isolation_level: config.isolation_level,
            text_factory: config.text_factory,
            read_only: config.read_only,
            uri: config.uri,
        }
    }

    pub fn iter_chunk_size(mut self, rows: usize) -> Self {
        self.iter_chunk_size = rows;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Stop waiting for any single operation after `timeout`.
    ///
    /// The operation itself is never interrupted; only the caller gives up.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn text_factory(mut self, factory: TextFactory) -> Self {
        self.text_factory = factory;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn uri(mut self, uri: bool) -> Self {
        self.uri = uri;
        self
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Spawn the connection thread and open the database on it.
    pub async fn connect(self) -> Result<Connection> {
        Connection::open(self).await
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(SqlActorError::Config("database path must not be empty".into()));
        }
        if self.iter_chunk_size == 0 {
            return Err(SqlActorError::Config("iter_chunk_size must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(SqlActorError::Config("poll_interval must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn open_flags(&self) -> OpenFlags {
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        flags |= OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.uri {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }
        flags
    }
}
