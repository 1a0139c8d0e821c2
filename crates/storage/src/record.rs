//! Storage cell
//!
//! A record pairs a [`VersionLock`] (commit-time concurrency control) with a
//! value guarded by its own `RwLock`. The value lock is held only for the
//! duration of a snapshot or a merge; it never spans a transaction.

use crate::version_lock::VersionLock;
use epochdb_core::{Delta, Key, RecordKind, RecordValue, Tid, TxnResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A typed, mergeable record
#[derive(Debug)]
pub struct Record {
    key: Key,
    kind: RecordKind,
    lock: VersionLock,
    localized: AtomicBool,
    value: RwLock<RecordValue>,
    conflicts: AtomicU64,
}

impl Record {
    /// Create an unlocked record at version zero
    pub fn new(key: Key, value: RecordValue) -> Self {
        Self::with_lock(key, value, VersionLock::new(Tid::ZERO))
    }

    /// Create a record whose version lock is already held
    ///
    /// The creator must eventually `unlock` it.
    pub fn new_locked(key: Key, value: RecordValue) -> Self {
        Self::with_lock(key, value, VersionLock::new_locked(Tid::ZERO))
    }

    fn with_lock(key: Key, value: RecordValue, lock: VersionLock) -> Self {
        Self {
            key,
            kind: value.kind(),
            lock,
            localized: AtomicBool::new(false),
            value: RwLock::new(value),
            conflicts: AtomicU64::new(0),
        }
    }

    /// The record key
    pub fn key(&self) -> Key {
        self.key
    }

    /// The variant tag; never changes
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// The commit-time version lock
    #[inline]
    pub fn lock(&self) -> &VersionLock {
        &self.lock
    }

    /// Whether writes to this record currently go through worker overlays
    #[inline]
    pub fn is_localized(&self) -> bool {
        self.localized.load(Ordering::Acquire)
    }

    pub(crate) fn set_localized(&self, on: bool) {
        self.localized.store(on, Ordering::Release);
    }

    /// Copy of the current value
    pub fn snapshot(&self) -> RecordValue {
        self.value.read().clone()
    }

    /// Merge a delta into the value under the value lock
    pub fn apply(&self, delta: &Delta, stamp: Tid) -> TxnResult<()> {
        self.value.write().apply(delta, stamp)
    }

    /// Replace the value wholesale
    ///
    /// Used for preloading. Callers must not race transactions on this key.
    pub fn replace(&self, value: RecordValue) {
        debug_assert_eq!(value.kind(), self.kind);
        *self.value.write() = value;
    }

    /// Count a sampled conflict on this record
    pub fn note_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Sampled conflicts observed on this record
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }
}
