// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! Every struct rejects unknown keys so a typo in `sqlactor.toml` is reported
//! instead of silently falling back to a default.

use serde::{Deserialize, Serialize};
use sqlactor_core::{IsolationLevel, TextFactory};

/// Top-level configuration. All sections are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SqlActorConfig {
    /// How connections are opened and driven.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging for the `sqlactor` binary.
    #[serde(default)]
    pub log: LogConfig,
}

/// Connection and actor settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Database file path, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,

    /// Rows requested per batch when a cursor is iterated as a stream.
    #[serde(default = "default_iter_chunk_size")]
    pub iter_chunk_size: usize,

    /// How long the connection thread waits for work before re-checking its state.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// SQLite busy handler timeout.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Caller-side wait limit per operation. 0 waits forever.
    #[serde(default)]
    pub operation_timeout_ms: u64,

    #[serde(default)]
    pub isolation_level: IsolationLevel,

    #[serde(default)]
    pub text_factory: TextFactory,

    /// Open the database read-only.
    #[serde(default)]
    pub read_only: bool,

    /// Interpret `database` as a `file:` URI.
    #[serde(default)]
    pub uri: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            iter_chunk_size: default_iter_chunk_size(),
            poll_interval_ms: default_poll_interval_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            operation_timeout_ms: 0,
            isolation_level: IsolationLevel::default(),
            text_factory: TextFactory::default(),
            read_only: false,
            uri: false,
        }
    }
}

fn default_database() -> String {
    ":memory:".to_string()
}

fn default_iter_chunk_size() -> usize {
    64
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// trace, debug, info, warn or error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
