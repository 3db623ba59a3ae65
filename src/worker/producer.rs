//! Producer role: generate, put, pause, repeat.

use std::time::Duration;

use tracing::{debug, info};

use crate::buffer::BoundedBuffer;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{Item, ItemId};

use super::{ExitReason, UnitKind, UnitReport, unit_name};

/// Repeatedly offers freshly generated items to a buffer.
pub struct Producer<T, G> {
    index: usize,
    name: String,
    buffer: BoundedBuffer<Item<T>>,
    token: CancelToken,
    delay: Duration,
    generate: G,
}

impl<T, G> Producer<T, G>
where
    T: Send + 'static,
    G: FnMut(ItemId) -> T,
{
    /// `delay` is the pause after each successful put; it is cut short by
    /// `token`.
    pub fn new(
        index: usize,
        buffer: BoundedBuffer<Item<T>>,
        token: CancelToken,
        delay: Duration,
        generate: G,
    ) -> Self {
        Self {
            index,
            name: unit_name(UnitKind::Producer, index),
            buffer,
            token,
            delay,
            generate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until the buffer stops or the token fires.
    pub fn run(mut self) -> UnitReport {
        let mut seq = 0u64;

        let exit = loop {
            let id = ItemId::new(self.index, seq);
            let payload = (self.generate)(id);

            match self.buffer.put_with(Item::new(id, payload), &self.token) {
                Ok(()) => {
                    seq += 1;
                    debug!(unit = %self.name, item = %id, "produced");
                }
                Err(e) => break exit_reason(&e),
            }

            // Nothing more can be admitted once stopped, so a pause cut
            // short by shutdown counts as a stop.
            if let Err(e) = self.token.sleep(self.delay) {
                if self.buffer.is_stopped() {
                    break ExitReason::Stopped;
                }
                break exit_reason(&e);
            }
        };

        info!(unit = %self.name, produced = seq, reason = %exit, "producer exiting");
        UnitReport {
            name: self.name,
            kind: UnitKind::Producer,
            items: seq,
            failures: 0,
            exit,
        }
    }
}

// put_with and sleep only fail with Stopped or Cancelled.
fn exit_reason(err: &Error) -> ExitReason {
    ExitReason::from_error(err).unwrap_or(ExitReason::Cancelled)
}
