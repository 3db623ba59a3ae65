//! Consumer role: take, handle, pause, repeat.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer::BoundedBuffer;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::model::Item;

use super::{ExitReason, UnitKind, UnitReport, unit_name};

/// Drains a buffer, passing each item to a handler.
pub struct Consumer<T, H> {
    name: String,
    buffer: BoundedBuffer<Item<T>>,
    token: CancelToken,
    delay: Duration,
    handle: H,
}

impl<T, H> Consumer<T, H>
where
    T: Send + 'static,
    H: FnMut(Item<T>) -> Result<()>,
{
    pub fn new(
        index: usize,
        buffer: BoundedBuffer<Item<T>>,
        token: CancelToken,
        delay: Duration,
        handle: H,
    ) -> Self {
        Self {
            name: unit_name(UnitKind::Consumer, index),
            buffer,
            token,
            delay,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until the buffer is stopped and drained, or the token fires.
    ///
    /// A handler error or panic is logged and counted; it does not end the
    /// loop.
    pub fn run(mut self) -> UnitReport {
        let mut items = 0u64;
        let mut failures = 0u64;

        let exit = loop {
            let item = match self.buffer.take_with(&self.token) {
                Ok(item) => item,
                Err(e) => break ExitReason::from_error(&e).unwrap_or(ExitReason::Cancelled),
            };

            let id = item.id;
            items += 1;
            let handle = &mut self.handle;
            match catch_unwind(AssertUnwindSafe(|| handle(item))) {
                Ok(Ok(())) => debug!(unit = %self.name, item = %id, "consumed"),
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(unit = %self.name, item = %id, error = %e, "handler failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(unit = %self.name, item = %id, "handler panicked");
                }
            }

            if self.token.sleep(self.delay).is_err() {
                break ExitReason::Cancelled;
            }
        };

        info!(unit = %self.name, consumed = items, failures, reason = %exit, "consumer exiting");
        UnitReport {
            name: self.name,
            kind: UnitKind::Consumer,
            items,
            failures,
            exit,
        }
    }
}
