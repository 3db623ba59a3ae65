//! Shutdown coordinator: starts producers and consumers against one buffer,
//! then stops them without forcing any thread to die.
//!
//! Shutdown is graceful by default. [`Coordinator::stop`] closes the buffer to
//! new items; consumers drain what is left and exit on `Stopped`. Only units
//! that outlive the grace period are cancelled through their tokens.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::buffer::{BoundedBuffer, BufferStats};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::model::{Item, ItemId};
use crate::telemetry::work::{record_unit_exit, start_unit_span};
use crate::worker::{Consumer, Producer, UnitKind, UnitReport, unit_name};

/// Shape of a run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    /// Pause after each produced item.
    pub produce_delay: Duration,
    /// Pause after each consumed item.
    pub consume_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            producers: 2,
            consumers: 2,
            produce_delay: Duration::from_millis(1000),
            consume_delay: Duration::from_millis(1500),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitReport>,
    /// Items put by all producers.
    pub produced: u64,
    /// Items taken by all consumers.
    pub consumed: u64,
    /// Items whose handler failed.
    pub failures: u64,
    /// Items still in the buffer after every unit exited.
    pub remaining: usize,
    pub buffer: BufferStats,
}

/// Count of units still running, with a condition to wait for zero.
#[derive(Default)]
struct Liveness {
    active: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the live count when a unit's thread ends, panicking or not.
struct LiveGuard(Arc<Liveness>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut active = self
            .0
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *active -= 1;
        if *active == 0 {
            self.0.idle.notify_all();
        }
    }
}

struct Unit {
    name: String,
    kind: UnitKind,
    token: CancelToken,
    handle: JoinHandle<UnitReport>,
}

/// Owns the buffer and the threads of one run.
pub struct Coordinator<T> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    buffer: BoundedBuffer<Item<T>>,
    units: Vec<Unit>,
    liveness: Arc<Liveness>,
}

impl<T: Send + 'static> Coordinator<T> {
    /// Build the buffer and spawn every producer and consumer.
    ///
    /// `generate` makes the payload for each item; `handle` processes each
    /// taken item. Both are shared by all units of their role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a zero capacity, or
    /// [`Error::Io`] if a thread cannot be spawned. In the latter case the
    /// units already started are cancelled and joined first.
    pub fn start<G, H>(config: CoordinatorConfig, generate: G, handle: H) -> Result<Self>
    where
        G: Fn(ItemId) -> T + Send + Sync + 'static,
        H: Fn(Item<T>) -> Result<()> + Send + Sync + 'static,
    {
        let buffer = BoundedBuffer::new(config.capacity)?;
        let mut coordinator = Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            buffer,
            units: Vec::with_capacity(config.producers + config.consumers),
            liveness: Arc::new(Liveness::default()),
        };

        info!(
            run_id = %coordinator.run_id,
            capacity = config.capacity,
            producers = config.producers,
            consumers = config.consumers,
            "coordinator starting"
        );

        let generate = Arc::new(generate);
        let handle = Arc::new(handle);

        for index in 0..config.producers {
            let generate = Arc::clone(&generate);
            let spawned = coordinator.spawn_unit(UnitKind::Producer, index, move |buffer, token| {
                Producer::new(index, buffer, token, config.produce_delay, move |id| {
                    generate(id)
                })
                .run()
            });
            if let Err(e) = spawned {
                coordinator.abort();
                return Err(e);
            }
        }

        for index in 0..config.consumers {
            let handle = Arc::clone(&handle);
            let spawned = coordinator.spawn_unit(UnitKind::Consumer, index, move |buffer, token| {
                Consumer::new(index, buffer, token, config.consume_delay, move |item| {
                    handle(item)
                })
                .run()
            });
            if let Err(e) = spawned {
                coordinator.abort();
                return Err(e);
            }
        }

        Ok(coordinator)
    }

    fn spawn_unit<F>(&mut self, kind: UnitKind, index: usize, body: F) -> Result<()>
    where
        F: FnOnce(BoundedBuffer<Item<T>>, CancelToken) -> UnitReport + Send + 'static,
    {
        let name = unit_name(kind, index);
        let token = CancelToken::new();
        let buffer = self.buffer.clone();
        let unit_token = token.clone();
        let span = start_unit_span(kind, &name, &self.run_id);

        *self
            .liveness
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        let guard = LiveGuard(Arc::clone(&self.liveness));

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _guard = guard;
                let report = span.in_scope(|| body(buffer, unit_token));
                record_unit_exit(&span, report.exit, report.items);
                report
            })?;

        self.units.push(Unit {
            name,
            kind,
            token,
            handle,
        });
        Ok(())
    }

    // Start-up failure: tear down whatever was spawned.
    fn abort(&mut self) {
        self.buffer.stop();
        for unit in self.units.drain(..) {
            unit.token.cancel();
            if unit.handle.join().is_err() {
                warn!(unit = %unit.name, "unit panicked during aborted start");
            }
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The shared buffer, e.g. for observing its length.
    pub fn buffer(&self) -> &BoundedBuffer<Item<T>> {
        &self.buffer
    }

    /// Stop the buffer and cut producers' pauses short.
    ///
    /// Consumers are left running so they drain the buffer. Safe to call
    /// repeatedly and concurrently with any buffer operation.
    pub fn stop(&self) {
        if self.buffer.stop() {
            info!(run_id = %self.run_id, pending = self.buffer.len(), "stop requested");
        }
        for unit in self.units.iter().filter(|u| u.kind == UnitKind::Producer) {
            unit.token.cancel();
        }
    }

    /// Cancel every unit. Items still buffered are abandoned.
    pub fn interrupt(&self) {
        let mut fired = 0;
        for unit in &self.units {
            if unit.token.cancel() {
                fired += 1;
            }
        }
        if fired > 0 {
            warn!(run_id = %self.run_id, units = fired, "interrupting units");
        }
    }

    /// Number of units whose loop has not yet ended.
    pub fn active(&self) -> usize {
        *self
            .liveness
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until every unit has exited or `timeout` elapses. Returns `true`
    /// if all units exited.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut active = self
            .liveness
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while *active > 0 {
            active = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.liveness
                        .idle
                        .wait_timeout(active, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .liveness
                    .idle
                    .wait(active)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }

    /// Stop, give units `grace` to exit on their own, cancel any stragglers,
    /// then join everything.
    pub fn shutdown(self, grace: Duration) -> Result<RunReport> {
        self.stop();
        if !self.wait_idle(grace) {
            warn!(
                run_id = %self.run_id,
                active = self.active(),
                grace = ?grace,
                "grace period elapsed"
            );
            self.interrupt();
        }
        self.join()
    }

    /// Join every unit without signalling anything.
    ///
    /// Blocks until the units exit by themselves, so call [`stop`](Self::stop)
    /// or [`interrupt`](Self::interrupt) first unless another thread will.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPanicked`] naming the first unit that panicked.
    /// All units are joined before returning.
    pub fn join(mut self) -> Result<RunReport> {
        let units = std::mem::take(&mut self.units);
        let mut reports = Vec::with_capacity(units.len());
        let mut panicked = None;

        for unit in units {
            match unit.handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    warn!(unit = %unit.name, "unit panicked");
                    panicked.get_or_insert(unit.name);
                }
            }
        }

        if let Some(name) = panicked {
            return Err(Error::WorkerPanicked(name));
        }

        let sum = |kind: UnitKind| -> u64 {
            reports
                .iter()
                .filter(|r| r.kind == kind)
                .map(|r| r.items)
                .sum()
        };
        let produced = sum(UnitKind::Producer);
        let consumed = sum(UnitKind::Consumer);
        let failures = reports.iter().map(|r| r.failures).sum();

        let report = RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            produced,
            consumed,
            failures,
            remaining: self.buffer.len(),
            buffer: self.buffer.stats(),
            units: reports,
        };

        info!(
            run_id = %report.run_id,
            produced,
            consumed,
            remaining = report.remaining,
            "coordinator finished"
        );
        Ok(report)
    }
}

impl<T> Drop for Coordinator<T> {
    // Dropped without join: release every unit so no thread stays parked.
    fn drop(&mut self) {
        if self.units.is_empty() {
            return;
        }
        self.buffer.stop();
        for unit in &self.units {
            unit.token.cancel();
        }
        warn!(run_id = %self.run_id, units = self.units.len(), "coordinator dropped without join");
    }
}
