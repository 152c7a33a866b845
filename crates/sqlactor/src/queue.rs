// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch queue and completion handles.
//!
//! Producers on any thread or task push [`Operation`]s into an unbounded FIFO
//! channel; the single connection thread pops them one at a time. Each
//! operation carries a [`Completer`] whose paired [`Completion`] is awaited by
//! the submitting task.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use sqlactor_core::{Result, SqlActorError};
use tokio::sync::oneshot;

type Job<W> = Box<dyn FnOnce(&mut W) + Send + 'static>;

/// A deferred call against the connection-thread state `W`.
pub struct Operation<W> {
    seq: u64,
    label: &'static str,
    job: Job<W>,
}

impl<W> Operation<W> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run the operation, consuming it.
    pub fn run(self, state: &mut W) {
        (self.job)(state);
    }
}

impl<W> fmt::Debug for Operation<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("seq", &self.seq)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Producer side of the queue. Cheap to clone; enqueueing never blocks.
pub struct DispatchQueue<W> {
    tx: mpsc::Sender<Operation<W>>,
    next_seq: Arc<AtomicU64>,
}

impl<W> Clone for DispatchQueue<W> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_seq: Arc::clone(&self.next_seq),
        }
    }
}

/// Consumer side of the queue, owned by the connection thread.
pub struct QueueReceiver<W> {
    rx: mpsc::Receiver<Operation<W>>,
}

/// Outcome of waiting on the queue for one poll interval.
#[derive(Debug)]
pub enum Next<W> {
    Op(Operation<W>),
    /// Nothing arrived within the poll interval.
    Idle,
    /// Every producer has been dropped and the queue is drained.
    Disconnected,
}

/// Create a connected producer/consumer pair.
pub fn channel<W>() -> (DispatchQueue<W>, QueueReceiver<W>) {
    let (tx, rx) = mpsc::channel();
    (
        DispatchQueue {
            tx,
            next_seq: Arc::new(AtomicU64::new(1)),
        },
        QueueReceiver { rx },
    )
}

impl<W> DispatchQueue<W> {
    /// Enqueue `job`. Fails with [`SqlActorError::Closed`] once the consumer is gone.
    ///
    /// Returns the sequence number assigned to the operation.
    pub fn submit<F>(&self, label: &'static str, job: F) -> Result<u64>
    where
        F: FnOnce(&mut W) + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let op = Operation {
            seq,
            label,
            job: Box::new(job),
        };
        self.tx.send(op).map_err(|_| SqlActorError::Closed)?;
        Ok(seq)
    }
}

impl<W> QueueReceiver<W> {
    /// Wait up to `poll` for the next operation.
    pub fn next(&self, poll: Duration) -> Next<W> {
        match self.rx.recv_timeout(poll) {
            Ok(op) => Next::Op(op),
            Err(RecvTimeoutError::Timeout) => Next::Idle,
            Err(RecvTimeoutError::Disconnected) => Next::Disconnected,
        }
    }
}

/// Write side of a single-assignment result slot.
///
/// `complete` consumes the completer, so a slot can only ever be written once.
/// Dropping it unwritten resolves the waiting side with `Closed`.
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T>>,
}

/// Read side of a single-assignment result slot.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

/// Create a linked completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Completion { rx })
}

impl<T> Completer<T> {
    /// Deliver the outcome. Returns false if the caller stopped waiting.
    pub fn complete(self, outcome: Result<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// True when the waiting side has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Completion<T> {
    /// Suspend until the outcome is delivered.
    pub async fn wait(self) -> Result<T> {
        self.rx.await.unwrap_or(Err(SqlActorError::Closed))
    }

    /// Like [`wait`](Self::wait), but give up after `limit`.
    ///
    /// Giving up does not retract the operation; its result is discarded.
    pub async fn wait_timeout(self, limit: Duration) -> Result<T> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SqlActorError::Timeout { duration: limit }),
        }
    }
}
