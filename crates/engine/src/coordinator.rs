//! Epoch coordinator
//!
//! Owns the global epoch (published through the [`EpochBarrier`]) and drives
//! advances. One advance runs at a time; timer ticks, accelerate requests,
//! manual calls and shutdown all funnel through [`Coordinator::advance`].
//!
//! Promotion decisions run on stats boundaries only, every
//! `stats_interval` ticks. A timer tick that is not a stats boundary is
//! skipped outright while no key is localized: there is nothing to merge.

use crate::barrier::EpochBarrier;
use crate::database::Shared;
use epochdb_concurrency::{CandidateTracker, DemotionHistory};
use epochdb_core::{Key, Tid};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info};

/// What started an advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Periodic timer
    Timer,
    /// Accelerate request, e.g. stash back-pressure
    Accelerate,
    /// Explicit `advance_epoch` call
    Manual,
    /// Final advance at shutdown; demotes every key
    Shutdown,
}

impl Trigger {
    fn is_forced(self) -> bool {
        self != Trigger::Timer
    }
}

/// Outcome of one completed advance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochReport {
    /// The epoch now in effect
    pub epoch: Tid,
    /// Whether promotion decisions ran
    pub stats_boundary: bool,
    /// Keys switched to localized mode
    pub promoted: Vec<Key>,
    /// Keys switched back to global mode
    pub demoted: Vec<Key>,
}

#[derive(Debug, Default)]
struct AdvanceState {
    ticks: u64,
    history: DemotionHistory,
}

#[derive(Debug, Default)]
struct Signal {
    accelerate: bool,
    stop: bool,
}

/// Global epoch owner
#[derive(Debug)]
pub struct Coordinator {
    barrier: EpochBarrier,
    advance: Mutex<AdvanceState>,
    signal: Mutex<Signal>,
    wake: Condvar,
}

impl Coordinator {
    /// A coordinator starting at the first epoch
    pub fn new() -> Self {
        Self {
            barrier: EpochBarrier::new(Tid::FIRST_EPOCH),
            advance: Mutex::new(AdvanceState::default()),
            signal: Mutex::new(Signal::default()),
            wake: Condvar::new(),
        }
    }

    /// The current global epoch
    #[inline]
    pub fn epoch(&self) -> Tid {
        self.barrier.epoch()
    }

    /// The barrier workers synchronize on
    pub fn barrier(&self) -> &EpochBarrier {
        &self.barrier
    }

    /// Ask the timer thread for an advance as soon as possible
    pub fn accelerate(&self) {
        let mut signal = self.signal.lock();
        signal.accelerate = true;
        self.wake.notify_all();
    }

    /// Stop the timer thread
    pub(crate) fn stop(&self) {
        let mut signal = self.signal.lock();
        signal.stop = true;
        self.wake.notify_all();
    }

    /// Timer thread body: advance on each tick or accelerate request until
    /// stopped
    pub(crate) fn run(&self, shared: &Shared) {
        let interval = shared.config.epoch_interval();
        let mut deadline = interval.map(|d| Instant::now() + d);
        loop {
            let trigger = {
                let mut signal = self.signal.lock();
                loop {
                    if signal.stop {
                        return;
                    }
                    if signal.accelerate {
                        signal.accelerate = false;
                        break Trigger::Accelerate;
                    }
                    match deadline {
                        Some(at) if Instant::now() >= at => break Trigger::Timer,
                        Some(at) => {
                            self.wake.wait_until(&mut signal, at);
                        }
                        None => self.wake.wait(&mut signal),
                    }
                }
            };
            self.advance(shared, trigger);
            if let Some(d) = interval {
                deadline = Some(Instant::now() + d);
            }
        }
    }

    /// Run one advance; `None` if it was skipped
    ///
    /// Blocks until every worker has merged, joined and resumed.
    pub(crate) fn advance(&self, shared: &Shared, trigger: Trigger) -> Option<EpochReport> {
        let mut state = self.advance.lock();
        if trigger != Trigger::Shutdown && shared.is_shut_down() {
            return None;
        }

        state.ticks += 1;
        let stats_boundary =
            trigger != Trigger::Shutdown && state.ticks % shared.config.stats_interval == 0;
        if !trigger.is_forced() && !stats_boundary && !shared.store.any_localized() {
            shared.metrics.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            debug!(target: "epochdb::epoch", ticks = state.ticks, "Tick skipped, nothing localized");
            return None;
        }

        let workers = shared.workers.len();
        let next = self.epoch().next_epoch();
        self.barrier.begin(next, stats_boundary);
        debug!(
            target: "epochdb::epoch",
            epoch = next.epoch_number(),
            ?trigger,
            stats_boundary,
            "Epoch advance started"
        );

        let harvested = self.barrier.wait_acks(workers);
        let mut report = EpochReport {
            epoch: next,
            stats_boundary,
            promoted: Vec::new(),
            demoted: Vec::new(),
        };

        if stats_boundary {
            let mut aggregate = CandidateTracker::new(shared.config.policy());
            for tracker in harvested {
                aggregate.merge(tracker);
            }
            let localized = shared.store.localized_keys();
            let decision = aggregate.decide(&localized, &mut state.history);
            if !decision.is_empty() {
                let change = shared
                    .store
                    .apply_candidates(&decision.promote, &decision.demote);
                report.promoted = change.promoted;
                report.demoted = change.demoted;
            }
        }
        if trigger == Trigger::Shutdown {
            report.demoted.extend(shared.store.demote_all());
            state.history = DemotionHistory::default();
        }
        shared
            .metrics
            .promotions
            .fetch_add(report.promoted.len() as u64, Ordering::Relaxed);
        shared
            .metrics
            .demotions
            .fetch_add(report.demoted.len() as u64, Ordering::Relaxed);

        self.barrier.open_safe();
        self.barrier.wait_done(workers);
        self.barrier.open_go();
        shared.metrics.epochs.fetch_add(1, Ordering::Relaxed);

        if report.promoted.is_empty() && report.demoted.is_empty() {
            debug!(target: "epochdb::epoch", epoch = next.epoch_number(), "Epoch advanced");
        } else {
            info!(
                target: "epochdb::epoch",
                epoch = next.epoch_number(),
                promoted = report.promoted.len(),
                demoted = report.demoted.len(),
                "Epoch advanced"
            );
        }
        Some(report)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
