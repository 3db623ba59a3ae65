//! Worker span helpers.
//!
//! Every producer/consumer thread runs inside a `worker.run` span so its
//! log lines carry the unit name and the run they belong to.

use tracing::Span;
use uuid::Uuid;

use crate::worker::{ExitReason, UnitKind};

/// Start a span for one unit's loop.
///
/// The `worker.exit` field is declared empty and filled by
/// [`record_unit_exit`].
pub fn start_unit_span(kind: UnitKind, name: &str, run_id: &Uuid) -> Span {
    tracing::info_span!(
        "worker.run",
        "worker.kind" = kind.as_str(),
        "worker.name" = name,
        "run.id" = %run_id,
        "worker.exit" = tracing::field::Empty,
    )
}

/// Record how a unit's loop ended.
pub fn record_unit_exit(span: &Span, reason: ExitReason, items: u64) {
    span.record("worker.exit", reason.as_str());
    span.in_scope(|| {
        tracing::debug!(reason = reason.as_str(), items, "worker_exit");
    });
}
