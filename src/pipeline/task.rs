//! Thread-with-return-value wrapper for the per-frame detector tasks.
//!
//! The worker runs on its own thread and hands its result back over a
//! one-slot channel. `join` blocks with a deadline, so a hung detector
//! cannot stall the frame past the configured timeout; a timed-out join is
//! distinguishable from a completed-but-empty result.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

/// What `join` observed about the task.
#[derive(Debug)]
pub enum JoinOutcome<T> {
    Completed(T),
    /// The deadline elapsed first. The worker thread keeps running detached;
    /// there is no mid-task cancellation.
    TimedOut,
    /// The worker panicked before producing a result.
    Panicked,
}

impl<T> JoinOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            JoinOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// A unit of work running concurrently with the caller.
pub struct Task<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// Starts `work` on a new thread without blocking the caller.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(work));
            // The receiver may already have given up on a timeout.
            let _ = tx.send(result);
        });
        Self { rx }
    }

    /// Waits up to `timeout` for the task's return value.
    pub fn join(self, timeout: Duration) -> JoinOutcome<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(value)) => JoinOutcome::Completed(value),
            Ok(Err(_)) => JoinOutcome::Panicked,
            Err(RecvTimeoutError::Timeout) => JoinOutcome::TimedOut,
            // Sender dropped without a value: the thread died mid-panic.
            Err(RecvTimeoutError::Disconnected) => JoinOutcome::Panicked,
        }
    }
}
