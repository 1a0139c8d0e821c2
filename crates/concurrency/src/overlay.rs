//! Per-worker pending deltas for localized records
//!
//! While a record is localized, committed writes to it are folded into the
//! worker's overlay instead of the shared record. At the next epoch boundary
//! the worker merges every pending delta into the store and clears the
//! overlay. Because the merges commute, the order in which workers merge does
//! not matter; overwrites carry their commit stamp so the latest one wins.

use epochdb_core::{Delta, Key, Tid, TxnResult};
use epochdb_storage::Store;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct Pending {
    delta: Delta,
    stamp: Tid,
}

/// Pending-delta buffer owned by one worker
#[derive(Debug, Default)]
pub struct LocalOverlay {
    pending: FxHashMap<Key, Pending>,
    merged: u64,
}

impl LocalOverlay {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a committed delta for `key`
    pub fn absorb(&mut self, key: Key, delta: Delta, stamp: Tid) -> TxnResult<()> {
        match self.pending.get_mut(&key) {
            Some(p) => {
                p.delta.absorb(delta)?;
                p.stamp = p.stamp.max(stamp);
            }
            None => {
                self.pending.insert(key, Pending { delta, stamp });
            }
        }
        Ok(())
    }

    /// The pending delta for `key`
    pub fn get(&self, key: &Key) -> Option<&Delta> {
        self.pending.get(key).map(|p| &p.delta)
    }

    /// Number of keys with pending deltas
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total records merged over the overlay's lifetime
    pub fn merged(&self) -> u64 {
        self.merged
    }

    /// Apply every pending delta to the store and clear the overlay
    ///
    /// Returns the number of records merged.
    ///
    /// # Panics
    ///
    /// Panics if a pending key has no record or the record kind changed;
    /// localized records always exist and kinds are checked at commit.
    pub fn merge_into(&mut self, store: &Store) -> usize {
        let n = self.pending.len();
        for (key, p) in self.pending.drain() {
            let record = match store.get(&key) {
                Ok(r) => r,
                Err(e) => panic!("overlay merge: {}", e),
            };
            if let Err(e) = record.apply(&p.delta, p.stamp) {
                panic!("overlay merge into {}: {}", key, e);
            }
        }
        self.merged += n as u64;
        n
    }

    /// Drop every pending delta without applying it
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
