//! Optimistic transaction executor
//!
//! A transaction buffers its reads (key, record, observed version) and its
//! writes (key, delta) and touches shared state only at commit:
//!
//! 1. **Lock**: every write to a global record takes that record's version
//!    lock (try-once under [`LockMode::Optimistic`]). Missing records are
//!    created already locked. Any failure releases everything and aborts.
//! 2. **Validate**: a commit token greater than every observed version is
//!    chosen, then every read is re-verified. A read of a record this
//!    transaction itself locked passes if the lock still carries the observed
//!    version; a read that found nothing passes only if the key is still
//!    absent.
//! 3. **Apply**: writes to localized records fold into the worker overlay;
//!    the rest merge into their records, which are unlocked at the token.
//!
//! During [`Phase::Normal`], reading a localized record yields
//! [`TxnError::Stashed`]: its committed value is spread across worker
//! overlays until the next merge.

use crate::candidates::CandidateTracker;
use crate::context::{ReadEntry, TxnContext, WriteEntry};
use crate::overlay::LocalOverlay;
use crate::tid::TidGenerator;
use epochdb_core::{
    AbortReason, Delta, Key, LockMode, Phase, RankedEntry, RecordValue, Tid, TxnError, TxnResult,
    Value, MAX_TXN_WRITES,
};
use epochdb_storage::{Record, Store};
use std::sync::Arc;
use tracing::debug;

// Stamp used to fold a transaction's own buffered put into what it reads
const OWN_WRITE_STAMP: Tid = Tid::from_raw(u64::MAX >> 1);

/// Per-transaction execution settings
#[derive(Debug, Clone, Copy)]
pub struct TxnOptions {
    /// Current epoch token
    pub epoch: Tid,
    /// Worker phase the transaction runs in
    pub phase: Phase,
    /// Commit-time lock discipline
    pub lock_mode: LockMode,
    /// Whether this transaction feeds the candidate tracker
    pub sampled: bool,
}

impl Default for TxnOptions {
    fn default() -> Self {
        Self {
            epoch: Tid::FIRST_EPOCH,
            phase: Phase::Normal,
            lock_mode: LockMode::Optimistic,
            sampled: false,
        }
    }
}

/// An in-flight transaction
///
/// Borrows the worker's buffers and per-worker state for its lifetime, so a
/// worker can run only one transaction at a time.
pub struct Transaction<'a> {
    ctx: &'a mut TxnContext,
    store: &'a Store,
    overlay: &'a mut LocalOverlay,
    tracker: &'a mut CandidateTracker,
    tids: &'a mut TidGenerator,
    opts: TxnOptions,
}

impl<'a> Transaction<'a> {
    /// Start a transaction, clearing whatever the context held
    pub fn begin(
        ctx: &'a mut TxnContext,
        store: &'a Store,
        overlay: &'a mut LocalOverlay,
        tracker: &'a mut CandidateTracker,
        tids: &'a mut TidGenerator,
        opts: TxnOptions,
    ) -> Self {
        ctx.reset();
        Self {
            ctx,
            store,
            overlay,
            tracker,
            tids,
            opts,
        }
    }

    /// The phase this transaction runs in
    pub fn phase(&self) -> Phase {
        self.opts.phase
    }

    /// The epoch this transaction runs in
    pub fn epoch(&self) -> Tid {
        self.opts.epoch
    }

    /// Whether this transaction is sampled
    pub fn is_sampled(&self) -> bool {
        self.opts.sampled
    }

    /// The store this transaction runs against
    pub fn store(&self) -> &Store {
        self.store
    }

    /// Number of buffered writes
    pub fn write_count(&self) -> usize {
        self.ctx.write_count()
    }

    // Writes to this record go to the overlay, reads are stashed
    #[inline]
    fn is_split(&self, record: &Record) -> bool {
        self.opts.phase == Phase::Normal && self.store.any_localized() && record.is_localized()
    }

    /// Read the committed value of `key`
    ///
    /// If this transaction already wrote `key`, the buffered delta is applied
    /// on top of the committed value. Returns `NotFound` for a key with no
    /// record (and nothing buffered), `Stashed` for a localized key during
    /// the normal phase, and `Aborted` if the record is locked.
    pub fn read(&mut self, key: Key) -> TxnResult<RecordValue> {
        let sampled = self.opts.sampled;
        let own = self.ctx.write_index(&key);
        let record = self.store.lookup(&key);
        if sampled {
            self.store.note_access(&key);
        }

        if let Some(r) = &record {
            if self.is_split(r) {
                if sampled {
                    self.tracker.stash(key);
                }
                debug!(target: "epochdb::txn", %key, "Read of localized key stashed");
                return Err(TxnError::Stashed);
            }
        }
        if sampled {
            match own {
                Some(_) => self.tracker.read_after_write(key, false),
                None => self.tracker.read(key, false),
            }
        }

        let mut value = match record {
            None => {
                self.ctx.reads.push(ReadEntry {
                    key,
                    record: None,
                    version: Tid::ZERO,
                });
                match own {
                    Some(i) => self.ctx.writes[i].delta.kind().initial(),
                    None => return Err(TxnError::NotFound(key)),
                }
            }
            Some(r) => {
                let word = r.lock().peek();
                if word.is_locked() && self.opts.lock_mode != LockMode::Unlocked {
                    if sampled {
                        self.tracker.conflict(key, false);
                        r.note_conflict();
                    }
                    debug!(target: "epochdb::txn", %key, "Read of locked record");
                    return Err(TxnError::aborted(AbortReason::ReadLocked(key)));
                }
                let value = r.snapshot();
                self.ctx.reads.push(ReadEntry {
                    key,
                    record: Some(r),
                    version: word.version(),
                });
                value
            }
        };
        if let Some(i) = own {
            value.apply(&self.ctx.writes[i].delta, OWN_WRITE_STAMP)?;
        }
        Ok(value)
    }

    /// Read a counter or max record, treating a missing key as 0
    pub fn read_int(&mut self, key: Key) -> TxnResult<i64> {
        match self.read(key) {
            Ok(v) => v
                .as_int()
                .ok_or_else(|| TxnError::NoRetry(format!("{} is a {} record", key, v.kind()))),
            Err(TxnError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Buffer a write
    ///
    /// A second write to the same key folds into the first; mixing kinds on
    /// one key fails with `NoRetry`.
    ///
    /// # Panics
    ///
    /// Panics if the transaction buffers more than `MAX_TXN_WRITES` keys.
    pub fn write(&mut self, key: Key, delta: Delta) -> TxnResult<()> {
        if let Some(i) = self.ctx.write_index(&key) {
            return self.ctx.writes[i].delta.absorb(delta);
        }
        self.push_write(WriteEntry::new(key, delta, false));
        Ok(())
    }

    /// Buffer the creation of a new record, initialized by `delta`
    ///
    /// Commit fails with `NoRetry` if the key already exists.
    pub fn create(&mut self, key: Key, delta: Delta) -> TxnResult<()> {
        if self.ctx.write_index(&key).is_some() {
            return Err(TxnError::NoRetry(format!("key {} written before create", key)));
        }
        self.push_write(WriteEntry::new(key, delta, true));
        Ok(())
    }

    fn push_write(&mut self, entry: WriteEntry) {
        assert!(
            self.ctx.writes.len() < MAX_TXN_WRITES,
            "transaction exceeded {} buffered writes",
            MAX_TXN_WRITES
        );
        self.ctx.writes.push(entry);
    }

    /// Add to a counter
    pub fn add(&mut self, key: Key, amount: i64) -> TxnResult<()> {
        self.write(key, Delta::Add(amount))
    }

    /// Raise a max record
    pub fn max(&mut self, key: Key, value: i64) -> TxnResult<()> {
        self.write(key, Delta::Max(value))
    }

    /// Overwrite a record's value
    pub fn put(&mut self, key: Key, value: impl Into<Value>) -> TxnResult<()> {
        self.write(key, Delta::Put(value.into()))
    }

    /// Insert into a ranked list
    pub fn insert(&mut self, key: Key, entry: RankedEntry) -> TxnResult<()> {
        self.write(key, Delta::Insert(entry))
    }

    /// A fresh token, usable as a unique entity id
    pub fn unique_id(&mut self) -> Tid {
        self.tids.next(self.opts.epoch)
    }

    /// Discard the transaction
    pub fn abort(mut self) {
        self.release();
    }

    /// Try to commit; returns the commit token
    ///
    /// On any error every lock taken is released at its prior version and
    /// nothing is applied.
    pub fn commit(mut self) -> TxnResult<Tid> {
        if let Err(e) = self.lock_writes() {
            self.release();
            return Err(e);
        }
        let tid = self.tids.commit(self.opts.epoch, self.observed_max());
        if self.opts.lock_mode != LockMode::Unlocked {
            if let Err(e) = self.validate_reads() {
                self.release();
                return Err(e);
            }
        }
        self.apply_writes(tid);
        Ok(tid)
    }

    fn lock_writes(&mut self) -> TxnResult<()> {
        let mode = self.opts.lock_mode;
        if mode == LockMode::Blocking {
            self.ctx.writes.sort_unstable_by_key(|w| w.key);
        }
        for i in 0..self.ctx.writes.len() {
            let key = self.ctx.writes[i].key;
            let kind = self.ctx.writes[i].delta.kind();
            let must_create = self.ctx.writes[i].must_create;

            let record = match self.store.lookup(&key) {
                Some(_) if must_create => {
                    return Err(TxnError::NoRetry(format!("key {} already exists", key)))
                }
                Some(r) => r,
                None if mode == LockMode::Unlocked => {
                    if must_create {
                        self.store.create(key, kind.initial())?
                    } else {
                        self.store.get_or_create(key, kind)
                    }
                }
                None => match self.store.create_locked(key, kind) {
                    Ok(r) => {
                        let w = &mut self.ctx.writes[i];
                        w.record = Some(r);
                        w.locked = true;
                        w.prior = Tid::ZERO;
                        continue;
                    }
                    Err(e) if must_create => return Err(e),
                    // created concurrently; lock it like any other record
                    Err(_) => self.store.get(&key)?,
                },
            };

            if record.kind() != kind {
                return Err(TxnError::NoRetry(format!(
                    "{} delta applied to {} record {}",
                    kind,
                    record.kind(),
                    key
                )));
            }
            if self.is_split(&record) {
                // The overlay stamp must order after join-phase commits to
                // this record in the same epoch
                let w = &mut self.ctx.writes[i];
                w.prior = record.lock().peek().version();
                w.localized = true;
                w.record = Some(record);
                continue;
            }

            let prior = match mode {
                LockMode::Optimistic => match record.lock().try_lock() {
                    Some(v) => Some(v),
                    None => {
                        if self.opts.sampled {
                            self.tracker.conflict(key, false);
                            record.note_conflict();
                        }
                        debug!(target: "epochdb::txn", %key, "Write lock held, aborting");
                        return Err(TxnError::aborted(AbortReason::WriteLocked(key)));
                    }
                },
                LockMode::Blocking => Some(record.lock().lock_spinning()),
                LockMode::Unlocked => None,
            };
            let w = &mut self.ctx.writes[i];
            if let Some(v) = prior {
                w.locked = true;
                w.prior = v;
            }
            w.record = Some(record);
        }
        Ok(())
    }

    fn observed_max(&self) -> Tid {
        let reads = self.ctx.reads.iter().map(|r| r.version);
        let writes = self.ctx.writes.iter().map(|w| w.prior);
        reads.chain(writes).max().unwrap_or(Tid::ZERO)
    }

    // A read of a record this transaction locked is still valid if the lock
    // carries the version that was read
    fn owns(&self, key: &Key, record: &Record, version: Tid) -> bool {
        self.ctx.writes.iter().any(|w| w.key == *key && w.locked) && record.lock().is_owned_at(version)
    }

    fn validate_reads(&mut self) -> TxnResult<()> {
        for j in 0..self.ctx.reads.len() {
            let entry = &self.ctx.reads[j];
            let key = entry.key;
            let failure = match &entry.record {
                Some(r) => {
                    if r.lock().verify(entry.version) || self.owns(&key, r, entry.version) {
                        None
                    } else if r.lock().peek().is_locked() {
                        Some((AbortReason::ReadLocked(key), Some(Arc::clone(r))))
                    } else {
                        Some((AbortReason::StaleRead(key), Some(Arc::clone(r))))
                    }
                }
                None => match self.store.lookup(&key) {
                    None => None,
                    Some(r) if self.owns(&key, &r, Tid::ZERO) => None,
                    Some(r) => Some((AbortReason::Phantom(key), Some(r))),
                },
            };
            if let Some((reason, record)) = failure {
                if self.opts.sampled {
                    self.tracker.conflict(key, false);
                    if let Some(r) = record {
                        r.note_conflict();
                    }
                }
                debug!(target: "epochdb::txn", %key, %reason, "Validation failed");
                return Err(TxnError::aborted(reason));
            }
        }
        Ok(())
    }

    fn apply_writes(&mut self, tid: Tid) {
        let sampled = self.opts.sampled;
        for w in self.ctx.writes.drain(..) {
            if sampled {
                self.tracker.write(w.key, w.localized);
                self.store.note_access(&w.key);
            }
            if w.localized {
                if let Err(e) = self.overlay.absorb(w.key, w.delta, tid) {
                    panic!("overlay rejected a kind-checked write: {}", e);
                }
                continue;
            }
            let record = match w.record {
                Some(r) => r,
                None => panic!("write to {} reached apply without a record", w.key),
            };
            if let Err(e) = record.apply(&w.delta, tid) {
                panic!("record rejected a kind-checked write: {}", e);
            }
            if w.locked {
                record.lock().unlock(tid);
            } else {
                record.lock().bump(tid);
            }
        }
        self.ctx.reads.clear();
    }

    fn release(&mut self) {
        for w in self.ctx.writes.iter_mut() {
            if w.locked {
                if let Some(r) = &w.record {
                    r.lock().unlock(w.prior);
                }
                w.locked = false;
            }
        }
        self.ctx.reset();
    }
}
