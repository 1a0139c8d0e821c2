//! Reusable transaction buffers
//!
//! A worker runs one transaction at a time, so it keeps a single context and
//! clears it between transactions. Clearing keeps the allocated capacity,
//! which keeps the hot path allocation-free after warm-up.

use epochdb_core::{Delta, Key, Tid};
use epochdb_storage::Record;
use std::sync::Arc;

/// One entry of the read-set
#[derive(Debug, Clone)]
pub(crate) struct ReadEntry {
    pub(crate) key: Key,
    /// `None` records a read that found no record
    pub(crate) record: Option<Arc<Record>>,
    pub(crate) version: Tid,
}

/// One entry of the write-set; a key appears at most once
#[derive(Debug, Clone)]
pub(crate) struct WriteEntry {
    pub(crate) key: Key,
    pub(crate) delta: Delta,
    pub(crate) record: Option<Arc<Record>>,
    pub(crate) localized: bool,
    pub(crate) locked: bool,
    pub(crate) prior: Tid,
    pub(crate) must_create: bool,
}

impl WriteEntry {
    pub(crate) fn new(key: Key, delta: Delta, must_create: bool) -> Self {
        Self {
            key,
            delta,
            record: None,
            localized: false,
            locked: false,
            prior: Tid::ZERO,
            must_create,
        }
    }
}

/// Read-set and write-set buffers, reused across transactions
#[derive(Debug, Default)]
pub struct TxnContext {
    pub(crate) reads: Vec<ReadEntry>,
    pub(crate) writes: Vec<WriteEntry>,
}

impl TxnContext {
    /// Create a context with room for `reads` and `writes` entries
    pub fn with_capacity(reads: usize, writes: usize) -> Self {
        Self {
            reads: Vec::with_capacity(reads),
            writes: Vec::with_capacity(writes),
        }
    }

    /// Clear both buffers, keeping their capacity
    pub fn reset(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }

    /// Number of buffered reads
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Number of buffered writes
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Allocated capacity of the (read, write) buffers
    pub fn capacity(&self) -> (usize, usize) {
        (self.reads.capacity(), self.writes.capacity())
    }

    pub(crate) fn write_index(&self, key: &Key) -> Option<usize> {
        self.writes.iter().position(|w| w.key == *key)
    }
}
