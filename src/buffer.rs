//! Fixed-capacity FIFO buffer with blocking put/take and a terminal stop.
//!
//! One mutex guards the item queue and the stopped flag. A single condition
//! variable is shared by full-waiters and empty-waiters, so every state change
//! broadcasts: a single wake could land on the wrong class of waiter.
//!
//! Stop semantics:
//! - after [`stop`](BoundedBuffer::stop), `put` fails fast even with free space;
//! - `take` keeps delivering buffered items and reports `Stopped` only once
//!   the queue is empty.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tracing::debug;

use crate::cancel::{CancelToken, Wake};
use crate::error::{Error, Result};

/// Cumulative counters for a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Items admitted by `put`.
    pub accepted: u64,
    /// Items handed out by `take`.
    pub delivered: u64,
    /// Puts refused because the buffer was stopped.
    pub rejected: u64,
}

struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
    stats: BufferStats,
}

struct Shared<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T> Shared<T> {
    // No operation panics mid-update, so a poisoned guard still holds a
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Wake for Shared<T> {
    fn wake_all(&self) {
        let _guard = self.lock();
        self.changed.notify_all();
    }
}

/// Handle to a shared bounded buffer. Clones address the same buffer.
pub struct BoundedBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    stopped: false,
                    stats: BufferStats::default(),
                }),
                changed: Condvar::new(),
            }),
        })
    }

    /// Append `item`, blocking while the buffer is full.
    ///
    /// Returns `Err(Stopped)` without inserting once the buffer is stopped,
    /// including when the stop arrives while this call is blocked.
    pub fn put(&self, item: T) -> Result<()> {
        self.put_inner(item, None)
    }

    /// Remove the head item, blocking while the buffer is empty.
    ///
    /// After a stop, remaining items are still delivered; `Err(Stopped)` is
    /// returned only when the buffer is both stopped and empty.
    pub fn take(&self) -> Result<T> {
        self.take_inner(None)
    }

    /// Mark the buffer stopped and wake every waiter.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.lock();
        if state.stopped {
            return false;
        }
        state.stopped = true;
        self.shared.changed.notify_all();
        debug!(pending = state.items.len(), "buffer stopped");
        true
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().items.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    pub fn stats(&self) -> BufferStats {
        self.shared.lock().stats
    }

    fn put_inner(&self, item: T, token: Option<&CancelToken>) -> Result<()> {
        let shared = &*self.shared;
        let mut state = shared.lock();

        loop {
            if state.stopped {
                state.stats.rejected += 1;
                return Err(Error::Stopped);
            }
            if state.items.len() < shared.capacity {
                break;
            }
            if token.is_some_and(CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            state = shared.wait(state);
        }

        state.items.push_back(item);
        state.stats.accepted += 1;
        shared.changed.notify_all();
        Ok(())
    }

    fn take_inner(&self, token: Option<&CancelToken>) -> Result<T> {
        let shared = &*self.shared;
        let mut state = shared.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                state.stats.delivered += 1;
                shared.changed.notify_all();
                return Ok(item);
            }
            if state.stopped {
                return Err(Error::Stopped);
            }
            if token.is_some_and(CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            state = shared.wait(state);
        }
    }
}

impl<T: Send + 'static> BoundedBuffer<T> {
    /// Like [`put`](Self::put), but also returns `Err(Cancelled)` if `token`
    /// fires while the call is blocked on a full buffer.
    pub fn put_with(&self, item: T, token: &CancelToken) -> Result<()> {
        token.watch(self.waker());
        self.put_inner(item, Some(token))
    }

    /// Like [`take`](Self::take), but also returns `Err(Cancelled)` if `token`
    /// fires while the call is blocked on an empty buffer.
    pub fn take_with(&self, token: &CancelToken) -> Result<T> {
        token.watch(self.waker());
        self.take_inner(Some(token))
    }

    fn waker(&self) -> Weak<dyn Wake> {
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        weak
    }
}

impl<T> std::fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.shared.capacity)
            .field("len", &state.items.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}
