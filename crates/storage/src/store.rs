//! Sharded record store
//!
//! # Design
//!
//! - 256 shards, selected by the first key byte
//! - Each shard is an `RwLock<FxHashMap>`: lookups take the shared lock,
//!   creation re-checks under the exclusive lock
//! - Records are `Arc`-shared and live for the lifetime of the store
//! - The localized key set is rebuilt and swapped wholesale at epoch
//!   boundaries, never edited in place

use crate::record::Record;
use epochdb_core::{Key, RecordKind, RecordValue, TxnError, TxnResult, SHARD_COUNT};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Shard {
    rows: RwLock<FxHashMap<Key, Arc<Record>>>,
    accesses: AtomicU64,
}

/// Result of [`Store::apply_candidates`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateChange {
    /// Keys that switched to localized mode
    pub promoted: Vec<Key>,
    /// Keys that switched back to global mode
    pub demoted: Vec<Key>,
}

/// Sharded map from key to record
pub struct Store {
    shards: Box<[Shard]>,
    localized: Mutex<Arc<FxHashSet<Key>>>,
    any_localized: AtomicBool,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        let shards: Vec<Shard> = (0..SHARD_COUNT).map(|_| Shard::default()).collect();
        Self {
            shards: shards.into_boxed_slice(),
            localized: Mutex::new(Arc::new(FxHashSet::default())),
            any_localized: AtomicBool::new(false),
        }
    }

    #[inline]
    fn shard(&self, key: &Key) -> &Shard {
        &self.shards[key.shard()]
    }

    /// Look up a record without creating it
    #[inline]
    pub fn lookup(&self, key: &Key) -> Option<Arc<Record>> {
        self.shard(key).rows.read().get(key).cloned()
    }

    /// Look up a record, failing with `NotFound` if absent
    pub fn get(&self, key: &Key) -> TxnResult<Arc<Record>> {
        self.lookup(key).ok_or(TxnError::NotFound(*key))
    }

    /// Return the record for `key`, creating it with `kind`'s initial value
    ///
    /// Concurrent creators converge on a single record. If the key already
    /// exists with another kind, the existing record is returned unchanged.
    pub fn get_or_create(&self, key: Key, kind: RecordKind) -> Arc<Record> {
        let shard = self.shard(&key);
        if let Some(r) = shard.rows.read().get(&key) {
            return Arc::clone(r);
        }
        let mut rows = shard.rows.write();
        Arc::clone(
            rows.entry(key)
                .or_insert_with(|| Arc::new(Record::new(key, kind.initial()))),
        )
    }

    /// Create a record, failing if the key already exists
    pub fn create(&self, key: Key, initial: RecordValue) -> TxnResult<Arc<Record>> {
        self.insert_new(key, Record::new(key, initial))
    }

    /// Create a record whose version lock is already held by the caller
    ///
    /// Fails with `NoRetry` if the key already exists.
    pub fn create_locked(&self, key: Key, kind: RecordKind) -> TxnResult<Arc<Record>> {
        self.insert_new(key, Record::new_locked(key, kind.initial()))
    }

    fn insert_new(&self, key: Key, record: Record) -> TxnResult<Arc<Record>> {
        let mut rows = self.shard(&key).rows.write();
        if rows.contains_key(&key) {
            return Err(TxnError::NoRetry(format!("key {} already exists", key)));
        }
        let record = Arc::new(record);
        rows.insert(key, Arc::clone(&record));
        Ok(record)
    }

    /// Seed a record with a value, creating it if needed
    ///
    /// An existing record of another kind is replaced. Meant for loading data
    /// before transactions run.
    pub fn load(&self, key: Key, value: RecordValue) -> Arc<Record> {
        let mut rows = self.shard(&key).rows.write();
        match rows.get(&key) {
            Some(r) if r.kind() == value.kind() => {
                r.replace(value);
                Arc::clone(r)
            }
            _ => {
                let record = Arc::new(Record::new(key, value));
                rows.insert(key, Arc::clone(&record));
                record
            }
        }
    }

    /// Count one sampled access against the key's shard
    #[inline]
    pub fn note_access(&self, key: &Key) {
        self.shard(key).accesses.fetch_add(1, Ordering::Relaxed);
    }

    /// Sampled access counts, indexed by shard
    pub fn shard_access_counts(&self) -> Vec<u64> {
        self.shards
            .iter()
            .map(|s| s.accesses.load(Ordering::Relaxed))
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.rows.read().len()).sum()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.rows.read().is_empty())
    }

    /// Whether `key` is currently localized
    pub fn is_localized(&self, key: &Key) -> bool {
        self.localized.lock().contains(key)
    }

    /// Whether any key is currently localized
    #[inline]
    pub fn any_localized(&self) -> bool {
        self.any_localized.load(Ordering::Acquire)
    }

    /// The current localized key set
    pub fn localized_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.localized.lock().iter().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Promote and demote keys
    ///
    /// Builds the next localized set from the current one, flips the record
    /// flags and swaps the set in. Must only be called while no worker is
    /// executing transactions. Keys without a record cannot be promoted;
    /// keys not currently localized are ignored for demotion.
    pub fn apply_candidates(&self, promote: &[Key], demote: &[Key]) -> CandidateChange {
        let mut guard = self.localized.lock();
        let mut next: FxHashSet<Key> = (**guard).clone();
        let mut change = CandidateChange::default();

        for key in demote {
            if next.remove(key) {
                if let Some(r) = self.lookup(key) {
                    r.set_localized(false);
                }
                change.demoted.push(*key);
            }
        }
        for key in promote {
            if next.contains(key) {
                continue;
            }
            if let Some(r) = self.lookup(key) {
                r.set_localized(true);
                next.insert(*key);
                change.promoted.push(*key);
            }
        }

        self.any_localized.store(!next.is_empty(), Ordering::Release);
        *guard = Arc::new(next);
        if !change.promoted.is_empty() || !change.demoted.is_empty() {
            debug!(
                target: "epochdb::epoch",
                promoted = change.promoted.len(),
                demoted = change.demoted.len(),
                "Localized set changed"
            );
        }
        change
    }

    /// Demote every localized key
    pub fn demote_all(&self) -> Vec<Key> {
        let keys = self.localized_keys();
        self.apply_candidates(&[], &keys).demoted
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.shards.len())
            .field("records", &self.len())
            .field("localized", &self.localized.lock().len())
            .finish()
    }
}
