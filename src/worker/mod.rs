//! Producer and consumer roles.
//!
//! Each unit owns a handle to the shared buffer and its own cancel token,
//! runs a loop on its own thread, and returns a [`UnitReport`] when the loop
//! ends. Both ways out of the loop are orderly: `Stopped` from the buffer or
//! `Cancelled` from the token.

pub mod consumer;
pub mod producer;

pub use consumer::Consumer;
pub use producer::Producer;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which role a unit plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Producer,
    Consumer,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Producer => "producer",
            UnitKind::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why a unit's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The buffer was stopped (and, for consumers, drained).
    Stopped,
    /// The unit's cancel token fired.
    Cancelled,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Stopped => "stopped",
            ExitReason::Cancelled => "cancelled",
        }
    }

    /// Map a shutdown error to its exit reason. `None` for anything else.
    pub fn from_error(err: &Error) -> Option<Self> {
        match err {
            Error::Stopped => Some(ExitReason::Stopped),
            Error::Cancelled => Some(ExitReason::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// What a unit did before it exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub name: String,
    pub kind: UnitKind,
    /// Items successfully put (producer) or taken (consumer).
    pub items: u64,
    /// Items whose handler returned an error. Always 0 for producers.
    pub failures: u64,
    pub exit: ExitReason,
}

/// Name a unit by role and index, e.g. `producer-0`.
pub fn unit_name(kind: UnitKind, index: usize) -> String {
    format!("{kind}-{index}")
}
