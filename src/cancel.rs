//! Per-unit cancellation.
//!
//! A [`CancelToken`] plays the role of a thread interrupt: the host fires it,
//! and the unit observes it the next time it would block, either inside a
//! buffer operation or in [`CancelToken::sleep`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Something that parks threads on a condition and can wake all of them.
///
/// Implementors must take their own lock before broadcasting, so a waiter
/// that checked the token under that lock cannot miss the wake-up.
pub(crate) trait Wake: Send + Sync {
    fn wake_all(&self);
}

/// Cloneable cancellation signal. All clones share one flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    sleep_lock: Mutex<()>,
    sleepers: Condvar,
    /// Buffers this token has been waited on. Dead entries are pruned lazily.
    watched: Mutex<Vec<Weak<dyn Wake>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent; returns `true` only for the first call.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        {
            let _guard = self
                .inner
                .sleep_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.sleepers.notify_all();
        }

        // Snapshot first: waking takes each buffer's lock, and the watch list
        // must not be held across that.
        let watched: Vec<Arc<dyn Wake>> = self
            .inner
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for target in watched {
            target.wake_all();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `Err(Cancelled)` immediately if the token already fired, or as
    /// soon as it fires during the sleep.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        // None: the deadline is past what Instant can represent, so wait untimed.
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self
            .inner
            .sleep_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.is_cancelled() {
                return Err(Error::Cancelled);
            }
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    self.inner
                        .sleepers
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .sleepers
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Register `target` to be woken on cancellation. No-op if already present.
    ///
    /// Must be called before the caller checks [`is_cancelled`](Self::is_cancelled)
    /// under the target's lock.
    pub(crate) fn watch(&self, target: Weak<dyn Wake>) {
        let mut watched = self
            .inner
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        watched.retain(|w| w.strong_count() > 0);
        if !watched.iter().any(|w| Weak::ptr_eq(w, &target)) {
            watched.push(target);
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
