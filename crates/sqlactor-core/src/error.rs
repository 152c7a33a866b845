// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for sqlactor connections.
//!
//! Engine failures keep the category SQLite assigned them (integrity,
//! operational, programming, data) so callers can branch on them after the
//! failure has crossed from the connection thread back into their task.

use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for sqlactor operations.
pub type Result<T, E = SqlActorError> = std::result::Result<T, E>;

/// The error type returned by every sqlactor operation.
#[derive(Debug, Error)]
pub enum SqlActorError {
    /// A constraint was violated (UNIQUE, NOT NULL, CHECK, FOREIGN KEY, type mismatch).
    #[error("integrity error: {message}")]
    Integrity {
        message: String,
        source: Option<rusqlite::Error>,
    },

    /// The engine failed at runtime (missing table, syntax error, busy, interrupted, ...).
    #[error("operational error: {message}")]
    Operational {
        message: String,
        source: Option<rusqlite::Error>,
    },

    /// The API was used incorrectly (wrong bindings, closed cursor, several statements).
    #[error("programming error: {0}")]
    Programming(String),

    /// A value could not be converted to or from its SQLite representation.
    #[error("data error: {0}")]
    Data(String),

    /// The requested feature is not available in this build.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The connection actor has closed; the operation was never run.
    #[error("connection closed")]
    Closed,

    /// The operation panicked on the connection thread. The thread survived.
    #[error("operation panicked on connection thread: {0}")]
    Panicked(String),

    /// The caller stopped waiting. The operation itself still runs to completion.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Invalid connection options.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SqlActorError {
    /// Primary SQLite result code, when the failure came from the engine.
    pub fn sqlite_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Integrity { source, .. } | Self::Operational { source, .. } => {
                source.as_ref().and_then(rusqlite::Error::sqlite_error_code)
            }
            _ => None,
        }
    }

    /// True for the dedicated "connection closed" failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True when a constraint was violated.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.sqlite_code(), Some(ErrorCode::ConstraintViolation))
    }
}

impl From<rusqlite::Error> for SqlActorError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::Error as E;

        match &err {
            E::SqliteFailure(failure, msg) => {
                let code = failure.code;
                let message = msg.clone().unwrap_or_else(|| failure.to_string());
                match code {
                    ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch => Self::Integrity {
                        message,
                        source: Some(err),
                    },
                    ErrorCode::ApiMisuse | ErrorCode::ParameterOutOfRange => {
                        Self::Programming(message)
                    }
                    ErrorCode::TooBig => Self::Data(message),
                    _ => Self::Operational {
                        message,
                        source: Some(err),
                    },
                }
            }
            E::InvalidParameterCount(..)
            | E::InvalidParameterName(..)
            | E::MultipleStatement
            | E::ExecuteReturnedResults
            | E::QueryReturnedNoRows
            | E::InvalidColumnIndex(..)
            | E::InvalidColumnName(..) => Self::Programming(err.to_string()),
            E::FromSqlConversionFailure(..)
            | E::IntegralValueOutOfRange(..)
            | E::InvalidColumnType(..) => Self::Data(err.to_string()),
            _ => Self::Operational {
                message: err.to_string(),
                source: Some(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::os::raw::c_int, msg: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), Some(msg.to_string()))
    }

    #[test]
    fn constraint_failures_are_integrity_errors() {
        let err = SqlActorError::from(failure(
            rusqlite::ffi::SQLITE_CONSTRAINT,
            "UNIQUE constraint failed: t.id",
        ));
        assert!(matches!(err, SqlActorError::Integrity { .. }));
        assert!(err.is_constraint_violation());
        assert_eq!(err.to_string(), "integrity error: UNIQUE constraint failed: t.id");
    }

    #[test]
    fn generic_engine_errors_are_operational() {
        let err = SqlActorError::from(failure(rusqlite::ffi::SQLITE_ERROR, "no such table: foo"));
        assert!(matches!(err, SqlActorError::Operational { .. }));
        assert_eq!(err.sqlite_code(), Some(ErrorCode::Unknown));
        assert!(err.to_string().contains("no such table: foo"));
    }

    #[test]
    fn misuse_is_a_programming_error() {
        let err = SqlActorError::from(failure(rusqlite::ffi::SQLITE_MISUSE, "bad call"));
        assert!(matches!(err, SqlActorError::Programming(_)));

        let err = SqlActorError::from(rusqlite::Error::InvalidParameterCount(1, 2));
        assert!(matches!(err, SqlActorError::Programming(_)));
    }

    #[test]
    fn closed_has_a_stable_message() {
        assert_eq!(SqlActorError::Closed.to_string(), "connection closed");
        assert!(SqlActorError::Closed.is_closed());
        assert_eq!(SqlActorError::Closed.sqlite_code(), None);
    }
}
