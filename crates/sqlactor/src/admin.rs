// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection hooks: user functions, progress handler, tracing and extensions.

use std::panic::RefUnwindSafe;
use std::path::{Path, PathBuf};

use rusqlite::functions::FunctionFlags;
use sqlactor_core::{Result, TextFactory, Value};

use crate::actor::Worker;
use crate::connection::Connection;

impl Connection {
    /// Register a scalar SQL function.
    ///
    /// `n_args` of -1 accepts any number of arguments. An `Err` returned by
    /// `func` surfaces as an operational error of the statement that called it.
    pub async fn create_function<F>(
        &self,
        name: &str,
        n_args: i32,
        deterministic: bool,
        func: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + 'static,
    {
        let name = name.to_owned();
        let mut flags = FunctionFlags::SQLITE_UTF8;
        if deterministic {
            flags |= FunctionFlags::SQLITE_DETERMINISTIC;
        }
        self.actor()
            .call("create_function", move |worker: &mut Worker| {
                worker
                    .conn()?
                    .create_scalar_function(name.as_str(), n_args, flags, move |ctx| {
                        let args = (0..ctx.len())
                            .map(|i| Value::from_value_ref(ctx.get_raw(i), TextFactory::String))
                            .collect::<Result<Vec<Value>>>()
                            .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
                        func(&args).map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))
                    })?;
                Ok(())
            })
            .await
    }

    /// Call `handler` every `n` virtual machine instructions.
    ///
    /// Returning `true` aborts the running statement with an interrupt error.
    pub async fn set_progress_handler<F>(&self, n: i32, handler: F) -> Result<()>
    where
        F: FnMut() -> bool + Send + RefUnwindSafe + 'static,
    {
        self.actor()
            .call("set_progress_handler", move |worker: &mut Worker| {
                worker.conn()?.progress_handler(n, Some(handler));
                Ok(())
            })
            .await
    }

    pub async fn clear_progress_handler(&self) -> Result<()> {
        self.actor()
            .call("clear_progress_handler", |worker: &mut Worker| {
                worker.conn()?.progress_handler(0, None::<fn() -> bool>);
                Ok(())
            })
            .await
    }

    /// Install (or with `None`, remove) a callback receiving each statement's SQL.
    pub async fn set_trace_callback(&self, callback: Option<fn(&str)>) -> Result<()> {
        self.actor()
            .call("set_trace_callback", move |worker: &mut Worker| {
                #[allow(deprecated)]
                worker.conn()?.trace(callback);
                Ok(())
            })
            .await
    }

    /// Allow or forbid [`load_extension`](Self::load_extension).
    pub async fn enable_load_extension(&self, enabled: bool) -> Result<()> {
        self.actor()
            .call("enable_load_extension", move |worker: &mut Worker| {
                let conn = worker.conn()?;
                if enabled {
                    // SAFETY: only toggles the flag; loading stays an explicit, separate call.
                    unsafe { conn.load_extension_enable()? };
                } else {
                    conn.load_extension_disable()?;
                }
                Ok(())
            })
            .await
    }

    /// Load a SQLite extension library.
    ///
    /// # Safety
    ///
    /// The library runs arbitrary native code inside this process.
    pub async unsafe fn load_extension(
        &self,
        path: impl AsRef<Path>,
        entry_point: Option<&str>,
    ) -> Result<()> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let entry_point = entry_point.map(str::to_owned);
        self.actor()
            .call("load_extension", move |worker: &mut Worker| {
                let conn = worker.conn()?;
                // SAFETY: the caller of this unsafe fn vouches for the library.
                unsafe { conn.load_extension(&path, entry_point.as_deref())? };
                Ok(())
            })
            .await
    }
}
