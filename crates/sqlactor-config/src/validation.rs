// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::SqlActorConfig;

/// Accepted values for `log.level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Longest accepted actor poll interval.
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Validate a deserialized configuration, collecting every problem found.
pub fn validate_config(config: &SqlActorConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let conn = &config.connection;

    if conn.database.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "connection.database must not be empty".to_string(),
        });
    }

    if conn.iter_chunk_size == 0 {
        errors.push(ConfigError::Validation {
            message: "connection.iter_chunk_size must be at least 1".to_string(),
        });
    }

    if conn.poll_interval_ms == 0 || conn.poll_interval_ms > MAX_POLL_INTERVAL_MS {
        errors.push(ConfigError::Validation {
            message: format!(
                "connection.poll_interval_ms must be between 1 and {MAX_POLL_INTERVAL_MS}, got {}",
                conn.poll_interval_ms
            ),
        });
    }

    if conn.read_only && conn.database.trim() == ":memory:" {
        errors.push(ConfigError::Validation {
            message: "connection.read_only cannot be used with an in-memory database".to_string(),
        });
    }

    let level = config.log.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of: {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
