//! Core data model.
//!
//! An item is an opaque payload tagged with the producer that made it and
//! that producer's sequence number.

use serde::{Deserialize, Serialize};

/// Identity of an item: which producer emitted it, and its position in
/// that producer's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    pub producer: usize,
    /// Strictly increasing per producer, starting at 0.
    pub seq: u64,
}

impl ItemId {
    pub fn new(producer: usize, seq: u64) -> Self {
        Self { producer, seq }
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}#{}", self.producer, self.seq)
    }
}

/// A unit of work flowing through the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item<T> {
    pub id: ItemId,
    pub payload: T,
}

impl<T> Item<T> {
    pub fn new(id: ItemId, payload: T) -> Self {
        Self { id, payload }
    }
}
