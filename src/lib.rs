//! # workq
//!
//! Bounded concurrent work queue with cooperative shutdown.
//!
//! Provides a fixed-capacity blocking buffer ([`buffer`]), producer and
//! consumer roles that run against it ([`worker`]), a coordinator that starts
//! them and shuts them down gracefully ([`coordinator`]), and a fixed worker
//! pool built on the same buffer ([`pool`]).

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod pool;
pub mod telemetry;
pub mod worker;

pub use buffer::{BoundedBuffer, BufferStats};
pub use cancel::CancelToken;
pub use coordinator::{Coordinator, CoordinatorConfig, RunReport};
pub use error::{Error, Result};
pub use model::{Item, ItemId};
pub use pool::{FixedPool, PoolReport};
