//! Error types for workq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The buffer was stopped. Not a failure: callers treat it as "exit the loop".
    #[error("buffer stopped")]
    Stopped,

    /// The calling unit's cancel token fired while it was blocked or sleeping.
    #[error("cancelled")]
    Cancelled,

    #[error("invalid capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("worker {0} panicked")]
    WorkerPanicked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the two orderly exit signals, `Stopped` and `Cancelled`.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Stopped | Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
