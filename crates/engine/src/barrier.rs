//! Epoch barrier
//!
//! One advance moves every worker through the same four steps:
//!
//! ```text
//! coordinator            worker (x N)
//! begin(e) ------------> sees epoch e, merges overlay
//! wait_acks(N) <-------- ack(e)
//! [decide, promote]
//! open_safe() ---------> wait_safe(e), replays stash
//! wait_done(N) <-------- arrive_done(e)
//! open_go() -----------> wait_go(e), back to normal
//! ```
//!
//! The published epoch is written under the state lock in [`begin`], so a
//! worker that observes it always finds the counters already reset.
//!
//! [`begin`]: EpochBarrier::begin

use epochdb_concurrency::CandidateTracker;
use epochdb_core::Tid;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct BarrierState {
    epoch: Tid,
    stats_boundary: bool,
    acked: usize,
    done: usize,
    safe: bool,
    go: bool,
    harvested: Vec<CandidateTracker>,
    closed: bool,
}

/// Multi-phase barrier shared by the coordinator and all workers
#[derive(Debug)]
pub struct EpochBarrier {
    published: AtomicU64,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl EpochBarrier {
    /// A barrier at `epoch` with no advance in flight
    pub fn new(epoch: Tid) -> Self {
        Self {
            published: AtomicU64::new(epoch.raw()),
            state: Mutex::new(BarrierState {
                epoch,
                safe: true,
                go: true,
                ..Default::default()
            }),
            cond: Condvar::new(),
        }
    }

    /// The current global epoch
    #[inline]
    pub fn epoch(&self) -> Tid {
        Tid::from_raw(self.published.load(Ordering::Acquire))
    }

    /// Start the advance to `next`
    ///
    /// # Panics
    ///
    /// Panics if `next` does not move the epoch forward.
    pub fn begin(&self, next: Tid, stats_boundary: bool) {
        let mut state = self.state.lock();
        assert!(
            next > state.epoch,
            "epoch went backwards: {} -> {}",
            state.epoch,
            next
        );
        state.epoch = next;
        state.stats_boundary = stats_boundary;
        state.acked = 0;
        state.done = 0;
        state.safe = false;
        state.go = false;
        state.harvested.clear();
        self.published.store(next.raw(), Ordering::Release);
        self.cond.notify_all();
    }

    /// Acknowledge `epoch` once the worker's overlay is merged
    ///
    /// On a stats boundary the worker's tracker is harvested and handed to
    /// the coordinator.
    pub fn ack(&self, epoch: Tid, tracker: &mut CandidateTracker) {
        let mut state = self.state.lock();
        assert_eq!(state.epoch, epoch, "ack for an epoch not in flight");
        if state.stats_boundary {
            state.harvested.push(tracker.harvest());
        }
        state.acked += 1;
        self.cond.notify_all();
    }

    /// Wait for `workers` acks, returning the harvested trackers
    pub fn wait_acks(&self, workers: usize) -> Vec<CandidateTracker> {
        let mut state = self.state.lock();
        while state.acked < workers {
            self.cond.wait(&mut state);
        }
        std::mem::take(&mut state.harvested)
    }

    /// Release workers into the join phase
    pub fn open_safe(&self) {
        let mut state = self.state.lock();
        state.safe = true;
        self.cond.notify_all();
    }

    /// Wait until the join phase of `epoch` may start
    pub fn wait_safe(&self, epoch: Tid) {
        let mut state = self.state.lock();
        while state.epoch == epoch && !state.safe {
            self.cond.wait(&mut state);
        }
    }

    /// Report the join phase of `epoch` finished
    pub fn arrive_done(&self, epoch: Tid) {
        let mut state = self.state.lock();
        assert_eq!(state.epoch, epoch, "done for an epoch not in flight");
        state.done += 1;
        self.cond.notify_all();
    }

    /// Wait for `workers` done reports
    pub fn wait_done(&self, workers: usize) {
        let mut state = self.state.lock();
        while state.done < workers {
            self.cond.wait(&mut state);
        }
    }

    /// Release workers back into the normal phase
    pub fn open_go(&self) {
        let mut state = self.state.lock();
        state.go = true;
        self.cond.notify_all();
    }

    /// Wait until the normal phase after `epoch` may start
    ///
    /// Returns at once if a later advance already began, since that implies
    /// `epoch` completed.
    pub fn wait_go(&self, epoch: Tid) {
        let mut state = self.state.lock();
        while state.epoch == epoch && !state.go {
            self.cond.wait(&mut state);
        }
    }

    /// Sleep until the epoch moves past `seen`, the barrier closes, or
    /// `timeout` elapses; returns true if the epoch moved
    pub fn wait_for_epoch(&self, seen: Tid, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.epoch == seen && !state.closed {
            self.cond.wait_for(&mut state, timeout);
        }
        state.epoch > seen
    }

    /// Whether the advance in flight is a stats boundary
    pub fn is_stats_boundary(&self) -> bool {
        self.state.lock().stats_boundary
    }

    /// Stop idle waiters; no advance may begin afterwards
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
