// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared types for the sqlactor workspace.
//!
//! This crate holds the error taxonomy and the owned value model that cross
//! the boundary between caller tasks and a connection's private thread.

pub mod error;
pub mod types;

pub use error::{Result, SqlActorError};
pub use types::{FromValue, IsolationLevel, Params, Row, TextFactory, Value};
