//! Engine counters
//!
//! ## Memory Ordering
//!
//! Counters use `Relaxed`: each is an independent monotonic tally and no
//! other memory is published through them. A snapshot taken while workers
//! run may mix values from slightly different instants.

use crate::request::TxnReceipt;
use epochdb_core::{Phase, TxnError, TxnResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Engine-wide counters
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub(crate) commits: AtomicU64,
    pub(crate) aborts: AtomicU64,
    pub(crate) conflicts: AtomicU64,
    pub(crate) stashes: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) replays: AtomicU64,
    pub(crate) replay_failures: AtomicU64,
    pub(crate) promotions: AtomicU64,
    pub(crate) demotions: AtomicU64,
    pub(crate) epochs: AtomicU64,
    pub(crate) skipped_ticks: AtomicU64,
}

/// Per-worker counters
#[derive(Debug, Default)]
pub struct WorkerCounters {
    pub(crate) commits: AtomicU64,
    pub(crate) aborts: AtomicU64,
    pub(crate) stashes: AtomicU64,
    pub(crate) replays: AtomicU64,
    /// Requests currently parked in the stash queue
    pub(crate) parked: AtomicUsize,
}

impl EngineMetrics {
    /// Count one transaction outcome
    pub(crate) fn record(&self, worker: &WorkerCounters, outcome: &TxnResult<TxnReceipt>) {
        match outcome {
            Ok(_) => {
                self.commits.fetch_add(1, Ordering::Relaxed);
                worker.commits.fetch_add(1, Ordering::Relaxed);
            }
            Err(e @ TxnError::Aborted { .. }) => {
                self.aborts.fetch_add(1, Ordering::Relaxed);
                worker.aborts.fetch_add(1, Ordering::Relaxed);
                if e.is_conflict() {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(TxnError::Stashed) => {
                self.stashes.fetch_add(1, Ordering::Relaxed);
                worker.stashes.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Count one replayed stash entry
    pub(crate) fn record_replay(&self, worker: &WorkerCounters, failed: bool) {
        self.replays.fetch_add(1, Ordering::Relaxed);
        worker.replays.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.replay_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Per-worker view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    /// Worker index
    pub worker: usize,
    /// Epoch number the worker last completed
    pub epoch: u64,
    /// Current phase
    pub phase: Phase,
    /// Committed transactions
    pub commits: u64,
    /// Aborted transactions
    pub aborts: u64,
    /// Stashed transactions
    pub stashes: u64,
    /// Replayed stash entries
    pub replays: u64,
    /// Requests currently parked
    pub stash_len: usize,
}

impl WorkerSnapshot {
    pub(crate) fn new(worker: usize, epoch: u64, phase: Phase, counters: &WorkerCounters) -> Self {
        Self {
            worker,
            epoch,
            phase,
            commits: counters.commits.load(Ordering::Relaxed),
            aborts: counters.aborts.load(Ordering::Relaxed),
            stashes: counters.stashes.load(Ordering::Relaxed),
            replays: counters.replays.load(Ordering::Relaxed),
            stash_len: counters.parked.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the engine counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Committed transactions, replays included
    pub commits: u64,
    /// Aborted transactions
    pub aborts: u64,
    /// Aborts caused by lock conflicts or failed validation
    pub conflicts: u64,
    /// Transactions stashed during the normal phase
    pub stashes: u64,
    /// Transactions that ended with `NotFound` or `NoRetry`
    pub failures: u64,
    /// Stash entries replayed at join
    pub replays: u64,
    /// Stash entries that did not commit on replay
    pub replay_failures: u64,
    /// Keys promoted to localized mode
    pub promotions: u64,
    /// Keys demoted back to global mode
    pub demotions: u64,
    /// Completed epoch advances
    pub epochs: u64,
    /// Timer ticks skipped because nothing was localized
    pub skipped_ticks: u64,
    /// Currently localized keys
    pub localized_keys: usize,
    /// Per-worker counters
    pub workers: Vec<WorkerSnapshot>,
}

impl MetricsSnapshot {
    pub(crate) fn new(
        metrics: &EngineMetrics,
        localized_keys: usize,
        workers: Vec<WorkerSnapshot>,
    ) -> Self {
        Self {
            commits: metrics.commits.load(Ordering::Relaxed),
            aborts: metrics.aborts.load(Ordering::Relaxed),
            conflicts: metrics.conflicts.load(Ordering::Relaxed),
            stashes: metrics.stashes.load(Ordering::Relaxed),
            failures: metrics.failures.load(Ordering::Relaxed),
            replays: metrics.replays.load(Ordering::Relaxed),
            replay_failures: metrics.replay_failures.load(Ordering::Relaxed),
            promotions: metrics.promotions.load(Ordering::Relaxed),
            demotions: metrics.demotions.load(Ordering::Relaxed),
            epochs: metrics.epochs.load(Ordering::Relaxed),
            skipped_ticks: metrics.skipped_ticks.load(Ordering::Relaxed),
            localized_keys,
            workers,
        }
    }

    /// Fraction of finished attempts that committed
    pub fn commit_rate(&self) -> f64 {
        let finished = self.commits + self.aborts;
        if finished == 0 {
            0.0
        } else {
            self.commits as f64 / finished as f64
        }
    }

    /// Fraction of finished attempts that aborted
    pub fn abort_rate(&self) -> f64 {
        let finished = self.commits + self.aborts;
        if finished == 0 {
            0.0
        } else {
            self.aborts as f64 / finished as f64
        }
    }
}
