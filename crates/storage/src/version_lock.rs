//! Single-word optimistic lock with an embedded version
//!
//! The word holds the last committed version in bits 0..63 and a lock flag in
//! bit 63. Locking keeps the version bits, so a holder can still tell which
//! version it locked, and readers can distinguish "locked by someone" from
//! "changed since I looked".
//!
//! `try_lock` never blocks: it either wins one CAS or reports contention.

use epochdb_core::Tid;
use std::sync::atomic::{AtomicU64, Ordering};

const LOCKED: u64 = 1 << 63;

/// A snapshot of a lock word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWord(u64);

impl LockWord {
    /// Whether the lock flag is set
    #[inline]
    pub fn is_locked(self) -> bool {
        self.0 & LOCKED != 0
    }

    /// The version bits
    #[inline]
    pub fn version(self) -> Tid {
        Tid::from_raw(self.0 & !LOCKED)
    }

    /// The raw word
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Optimistic version lock
#[derive(Debug, Default)]
pub struct VersionLock {
    word: AtomicU64,
}

impl VersionLock {
    /// Create an unlocked lock at `version`
    pub fn new(version: Tid) -> Self {
        assert_eq!(version.raw() & LOCKED, 0, "version {:#x} overlaps the lock bit", version.raw());
        Self {
            word: AtomicU64::new(version.raw()),
        }
    }

    /// Create a lock that is already held, at `version`
    pub fn new_locked(version: Tid) -> Self {
        assert_eq!(version.raw() & LOCKED, 0, "version {:#x} overlaps the lock bit", version.raw());
        Self {
            word: AtomicU64::new(version.raw() | LOCKED),
        }
    }

    /// Try once to acquire the lock
    ///
    /// Returns the version that was current when the lock was taken, or `None`
    /// if the lock was held or another thread won the race.
    #[inline]
    pub fn try_lock(&self) -> Option<Tid> {
        let cur = self.word.load(Ordering::Acquire);
        if cur & LOCKED != 0 {
            return None;
        }
        self.word
            .compare_exchange(cur, cur | LOCKED, Ordering::AcqRel, Ordering::Relaxed)
            .ok()
            .map(Tid::from_raw)
    }

    /// Acquire the lock, spinning and then yielding while it is held
    pub fn lock_spinning(&self) -> Tid {
        let mut spins = 0u32;
        loop {
            if let Some(v) = self.try_lock() {
                return v;
            }
            if spins < 64 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Read the current word
    #[inline]
    pub fn peek(&self) -> LockWord {
        LockWord(self.word.load(Ordering::Acquire))
    }

    /// Release the lock, publishing `version`
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held, if `version` overlaps the lock bit, or
    /// if `version` is older than the version the lock was taken at.
    pub fn unlock(&self, version: Tid) {
        let cur = self.word.load(Ordering::Acquire);
        assert!(cur & LOCKED != 0, "unlock of an unlocked version lock");
        assert_eq!(version.raw() & LOCKED, 0, "version {:#x} overlaps the lock bit", version.raw());
        let prior = cur & !LOCKED;
        assert!(
            version.raw() >= prior,
            "version went backwards: {:#x} -> {:#x}",
            prior,
            version.raw()
        );
        if self
            .word
            .compare_exchange(cur, version.raw(), Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            panic!("version lock changed while held");
        }
    }

    /// True iff unlocked and still at `observed`
    #[inline]
    pub fn verify(&self, observed: Tid) -> bool {
        self.word.load(Ordering::Acquire) == observed.raw()
    }

    /// True iff locked and the locked word carries `observed`
    ///
    /// Lets a transaction validate a read of a record it locked itself.
    #[inline]
    pub fn is_owned_at(&self, observed: Tid) -> bool {
        self.word.load(Ordering::Acquire) == observed.raw() | LOCKED
    }

    /// Raise the version without locking
    ///
    /// Only meaningful when no thread uses the lock flag.
    pub fn bump(&self, version: Tid) {
        self.word.fetch_max(version.raw() & !LOCKED, Ordering::AcqRel);
    }
}
