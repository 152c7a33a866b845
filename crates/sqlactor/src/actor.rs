// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The connection thread.
//!
//! One OS thread per connection owns the `rusqlite::Connection` (inside a
//! [`Worker`]) and runs queued operations against it strictly in FIFO order.
//! Async handles only ever talk to it through the [`DispatchQueue`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use rusqlite::InterruptHandle;
use sqlactor_core::{IsolationLevel, Result, SqlActorError, TextFactory};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::exec::{CursorId, CursorState};
use crate::options::ConnectOptions;
use crate::queue::{self, Completion, DispatchQueue, Next, QueueReceiver};

static THREAD_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Lifecycle of a connection actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorState {
    NotStarted = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
}

impl ActorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// New work is refused once shutdown has begun.
    pub fn accepts_work(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// State visible from both the handles and the connection thread.
pub(crate) struct Shared {
    state: AtomicU8,
    stop: AtomicBool,
    interrupt: OnceLock<InterruptHandle>,
    database: PathBuf,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn new(database: PathBuf) -> Self {
        Self {
            state: AtomicU8::new(ActorState::NotStarted as u8),
            stop: AtomicBool::new(false),
            interrupt: OnceLock::new(),
            database,
            closed: watch::channel(false).0,
        }
    }

    pub(crate) fn state(&self) -> ActorState {
        ActorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ActorState) {
        self.state.store(state as u8, Ordering::Release);
        if state == ActorState::Closed {
            self.closed.send_replace(true);
        }
    }

    /// Resolve once the state has reached `Closed`.
    async fn wait_closed(&self) {
        let mut closed = self.closed.subscribe();
        // The sender lives as long as `self`, so this only returns on `true`.
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Move to `Closing` unless shutdown already began. Returns true if this call did it.
    fn begin_closing(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if matches!(
                ActorState::from_u8(current),
                ActorState::Closing | ActorState::Closed
            ) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                ActorState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Everything owned by the connection thread.
pub(crate) struct Worker {
    conn: Option<rusqlite::Connection>,
    pub(crate) cursors: HashMap<CursorId, CursorState>,
    pub(crate) next_cursor: u64,
    pub(crate) isolation_level: IsolationLevel,
    pub(crate) text_factory: TextFactory,
    finished: bool,
}

impl Worker {
    fn new(options: &ConnectOptions) -> Self {
        Self {
            conn: None,
            cursors: HashMap::new(),
            next_cursor: 1,
            isolation_level: options.isolation_level,
            text_factory: options.text_factory,
            finished: false,
        }
    }

    fn open(&mut self, options: &ConnectOptions) -> Result<InterruptHandle> {
        let conn = rusqlite::Connection::open_with_flags(&options.database, options.open_flags())?;
        conn.busy_timeout(options.busy_timeout)?;
        let handle = conn.get_interrupt_handle();
        self.conn = Some(conn);
        Ok(handle)
    }

    /// The live connection, or `Closed` once it has been released.
    pub(crate) fn conn(&mut self) -> Result<&mut rusqlite::Connection> {
        self.conn.as_mut().ok_or(SqlActorError::Closed)
    }

    /// Hand the connection to another thread for the duration of a backup.
    pub(crate) fn lend(&mut self) -> Result<rusqlite::Connection> {
        self.conn.take().ok_or(SqlActorError::Closed)
    }

    pub(crate) fn restore(&mut self, conn: rusqlite::Connection) {
        self.conn = Some(conn);
    }

    /// Stop the loop after the current operation.
    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    /// Release every cursor and the connection. The loop exits afterwards.
    pub(crate) fn close(&mut self) -> Result<()> {
        self.cursors.clear();
        self.finished = true;
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| err.into()),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing connection during shutdown");
        }
    }
}

/// Handle to a running connection thread.
pub(crate) struct Actor {
    queue: DispatchQueue<Worker>,
    shared: Arc<Shared>,
    timeout: Option<Duration>,
}

impl Actor {
    /// Start the thread and queue the connect operation as its first job.
    pub(crate) fn spawn(options: ConnectOptions) -> Result<(Self, Completion<()>)> {
        let (queue, rx) = queue::channel();
        let shared = Arc::new(Shared::new(options.database.clone()));
        let actor = Self {
            queue,
            shared: Arc::clone(&shared),
            timeout: options.operation_timeout,
        };

        let (completer, connected) = queue::completion();
        let poll = options.poll_interval;
        let worker = Worker::new(&options);
        let connect_shared = Arc::clone(&shared);
        actor.queue.submit("connect", move |worker: &mut Worker| {
            let outcome = worker.open(&options).map(|handle| {
                let _ = connect_shared.interrupt.set(handle);
                connect_shared.set_state(ActorState::Open);
            });
            if let Err(err) = &outcome {
                debug!(database = %options.database.display(), error = %err, "connect failed");
                worker.finish();
            }
            completer.complete(outcome);
        })?;

        shared.set_state(ActorState::Connecting);
        let name = format!("sqlactor-{}", THREAD_COUNTER.fetch_add(1, Ordering::Relaxed));
        thread::Builder::new()
            .name(name)
            .spawn(move || run(worker, rx, shared, poll))
            .map_err(|err| SqlActorError::Operational {
                message: format!("failed to spawn connection thread: {err}"),
                source: None,
            })?;

        Ok((actor, connected))
    }

    pub(crate) fn state(&self) -> ActorState {
        self.shared.state()
    }

    pub(crate) fn database(&self) -> &std::path::Path {
        &self.shared.database
    }

    pub(crate) fn interrupt_handle(&self) -> Option<&InterruptHandle> {
        self.shared.interrupt.get()
    }

    /// Queue `f` and return its completion without waiting.
    ///
    /// Refused with `Closed` once shutdown has begun.
    pub(crate) fn submit<T, F>(&self, label: &'static str, f: F) -> Result<Completion<T>>
    where
        F: FnOnce(&mut Worker) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.state().accepts_work() {
            return Err(SqlActorError::Closed);
        }
        self.enqueue(label, f)
    }

    fn enqueue<T, F>(&self, label: &'static str, f: F) -> Result<Completion<T>>
    where
        F: FnOnce(&mut Worker) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (completer, completion) = queue::completion();
        self.queue.submit(label, move |worker: &mut Worker| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(worker))).unwrap_or_else(
                |payload| {
                    let message = panic_message(payload.as_ref());
                    warn!(op = label, panic = %message, "operation panicked");
                    Err(SqlActorError::Panicked(message))
                },
            );
            if !completer.complete(outcome) {
                trace!(op = label, "caller stopped waiting; result discarded");
            }
        })?;
        Ok(completion)
    }

    /// Queue `f` and wait for its result, honouring the operation timeout.
    pub(crate) async fn call<T, F>(&self, label: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Worker) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let completion = self.submit(label, f)?;
        match self.timeout {
            Some(limit) => completion.wait_timeout(limit).await,
            None => completion.wait().await,
        }
    }

    /// Queue `f` without waiting for it. Errors are only logged.
    pub(crate) fn detach<F>(&self, label: &'static str, f: F)
    where
        F: FnOnce(&mut Worker) -> Result<()> + Send + 'static,
    {
        if let Err(err) = self.submit(label, f) {
            trace!(op = label, error = %err, "detached operation not queued");
        }
    }

    /// Close the connection after everything already queued has run.
    ///
    /// A call made while shutdown is already under way waits for it to finish.
    pub(crate) async fn close(&self) -> Result<()> {
        if !self.shared.begin_closing() {
            self.shared.wait_closed().await;
            return Ok(());
        }
        let completion = match self.enqueue("close", Worker::close) {
            Ok(completion) => completion,
            Err(_) => {
                self.shared.set_state(ActorState::Closed);
                return Ok(());
            }
        };
        let outcome = match completion.wait().await {
            Err(SqlActorError::Closed) => Ok(()),
            other => other,
        };
        self.shared.set_state(ActorState::Closed);
        outcome
    }

    /// Ask the thread to release the connection once its queue is drained.
    pub(crate) fn stop(&self) {
        if self.shared.begin_closing() {
            self.shared.stop.store(true, Ordering::Release);
        }
    }
}

fn run(mut worker: Worker, rx: QueueReceiver<Worker>, shared: Arc<Shared>, poll: Duration) {
    info!(database = %shared.database.display(), "connection thread started");
    loop {
        match rx.next(poll) {
            Next::Op(op) => {
                debug!(seq = op.seq(), op = op.label(), "running operation");
                op.run(&mut worker);
                if worker.finished {
                    break;
                }
            }
            Next::Idle => {
                trace!("idle");
                if shared.stop.load(Ordering::Acquire) {
                    worker.shutdown();
                    break;
                }
            }
            Next::Disconnected => {
                debug!("all handles dropped");
                worker.shutdown();
                break;
            }
        }
    }
    shared.set_state(ActorState::Closed);
    // Anything still queued resolves as `Closed` when its completer drops here.
    drop(rx);
    info!(database = %shared.database.display(), "connection thread stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
