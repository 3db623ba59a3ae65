//! Fixed-size worker pool on top of [`BoundedBuffer`].
//!
//! Tasks run first-come-first-served on a fixed set of threads. Submission
//! blocks while the queue is full. Shutdown stops admission and lets the
//! workers finish everything already queued.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::buffer::BoundedBuffer;
use crate::error::{Error, Result};

/// A unit of work for the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Totals for a pool after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub threads: usize,
    /// Tasks that returned normally.
    pub completed: u64,
    /// Tasks that panicked. The worker that ran them kept going.
    pub panicked: u64,
    /// Submissions refused after shutdown began.
    pub rejected: u64,
}

#[derive(Default)]
struct Tally {
    completed: u64,
    panicked: u64,
}

pub struct FixedPool {
    queue: BoundedBuffer<Task>,
    workers: Vec<JoinHandle<Tally>>,
}

impl FixedPool {
    /// Spawn `threads` workers sharing a queue of `queue_capacity` tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero threads, [`Error::InvalidCapacity`]
    /// for a zero queue, or [`Error::Io`] if a thread cannot be spawned.
    pub fn new(threads: usize, queue_capacity: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Config("pool needs at least one thread".to_string()));
        }

        let mut pool = Self {
            queue: BoundedBuffer::new(queue_capacity)?,
            workers: Vec::with_capacity(threads),
        };

        for index in 0..threads {
            let queue = pool.queue.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("pool-{index}"))
                .spawn(move || work(index, queue));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.queue.stop();
                    for (worker, handle) in pool.workers.drain(..).enumerate() {
                        if handle.join().is_err() {
                            warn!(worker, "pool worker panicked during aborted start");
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        info!(threads, queue_capacity, "pool started");
        Ok(pool)
    }

    /// Queue `task`, blocking while the queue is full.
    ///
    /// Returns `Err(Stopped)` once shutdown has begun.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.put(Box::new(task))
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stop admission, drain the queue, and join every worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPanicked`] if a worker thread itself died.
    /// Task panics are caught and only counted.
    pub fn shutdown(mut self) -> Result<PoolReport> {
        self.queue.stop();

        let mut report = PoolReport {
            threads: self.workers.len(),
            ..PoolReport::default()
        };
        let mut lost = None;

        for (index, handle) in std::mem::take(&mut self.workers).into_iter().enumerate() {
            match handle.join() {
                Ok(tally) => {
                    report.completed += tally.completed;
                    report.panicked += tally.panicked;
                }
                Err(_) => {
                    lost.get_or_insert(format!("pool-{index}"));
                }
            }
        }
        report.rejected = self.queue.stats().rejected;

        if let Some(name) = lost {
            return Err(Error::WorkerPanicked(name));
        }

        info!(
            completed = report.completed,
            panicked = report.panicked,
            rejected = report.rejected,
            "pool shut down"
        );
        Ok(report)
    }
}

impl Drop for FixedPool {
    // Dropped without shutdown: close the queue so workers drain and exit.
    fn drop(&mut self) {
        if self.queue.stop() && !self.workers.is_empty() {
            debug!(threads = self.workers.len(), "pool dropped without shutdown");
        }
    }
}

fn work(index: usize, queue: BoundedBuffer<Task>) -> Tally {
    let mut tally = Tally::default();

    loop {
        let task = match queue.take() {
            Ok(task) => task,
            Err(e) if e.is_shutdown() => break,
            Err(e) => {
                error!(worker = index, error = %e, "unexpected queue error");
                break;
            }
        };

        match catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => tally.completed += 1,
            Err(_) => {
                tally.panicked += 1;
                warn!(worker = index, "task panicked");
            }
        }
    }

    debug!(
        worker = index,
        completed = tally.completed,
        panicked = tally.panicked,
        "pool worker exiting"
    );
    tally
}
