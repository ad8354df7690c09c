//! Execution contexts for subscriber callbacks.
//!
//! Replay produces frames on a playback task or on whatever thread drives the
//! tick source. Subscribers instead run on a context chosen when the replay
//! session is opened, represented by a [`Dispatcher`] handle.

use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::trace;

/// Unit of work posted to a context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the execution context that must run subscriber code
pub trait Dispatcher: Send + Sync {
    /// Post a job. Jobs run in the order they were posted, one at a time.
    fn dispatch(&self, job: Job);
}

/// Create a queue-backed context.
///
/// The [`QueueDispatcher`] half is handed to the replay session; the
/// [`DispatchQueue`] half stays with the thread that should run subscribers
/// and is drained there.
pub fn dispatch_queue() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = channel::unbounded();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}

/// Posting side of a dispatch queue
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: Sender<Job>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            // Owning thread dropped its queue, nobody is listening
            trace!("Dispatch queue closed, dropping job");
        }
    }
}

/// Draining side of a dispatch queue
pub struct DispatchQueue {
    rx: Receiver<Job>,
}

impl DispatchQueue {
    /// Run every job that is already queued, without waiting
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one job and run it
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run jobs as they arrive until `timeout` has passed
    pub fn run_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while let Ok(job) = self.rx.recv_deadline(deadline) {
            job();
            ran += 1;
        }
        ran
    }

    /// Number of jobs waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
