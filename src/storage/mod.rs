//! Storage Contract
//!
//! The core treats persistence as an ordered byte-key value store with
//! prefix range scans, snapshot reads and atomic batch commit. Any engine
//! honouring [`Storage`] can sit underneath; [`MemoryStorage`] is the
//! reference implementation used by tests and embedded deployments.
//!
//! [`OverlayReader`] layers an in-memory delta on top of any snapshot; the
//! transaction write buffer and the reasoner's inferred-fact overlay both
//! use it, so traversals run unchanged over base or derived graphs.

mod memory;
mod overlay;

pub use memory::{MemorySnapshot, MemoryStorage};
pub use overlay::{Overlay, OverlayReader};

use std::sync::Arc;

/// An ordered, point-in-time read view of the key space
pub trait ReadableStorage: Send + Sync {
    /// Point read
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// All entries whose key starts with `prefix`, in ascending key order
    fn iterate_prefix(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>;

    /// Entries with `key >= from` and `key` starting with `prefix`, ascending.
    /// Used by predicate range scans over order-preserving value encodings.
    fn iterate_prefix_from(
        &self,
        prefix: &[u8],
        from: &[u8],
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>;
}

/// A write collected for atomic commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered batch of writes applied atomically
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.push(Write::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.writes.push(Write::Delete { key });
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn merge(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }
}

/// The persistence seam: snapshot reads plus atomic batch commit
pub trait Storage: Send + Sync {
    /// A consistent read view of the current committed state
    fn snapshot(&self) -> Arc<dyn ReadableStorage>;

    /// Apply a batch atomically; readers holding older snapshots are
    /// unaffected
    fn commit(&self, batch: WriteBatch);
}
