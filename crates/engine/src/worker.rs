//! Serial transaction executors
//!
//! A worker runs one transaction at a time against its own overlay, tracker
//! and stash queue, all kept in a [`WorkerCore`] behind one mutex. Whoever
//! holds that mutex (a submitting client or the worker's idle poller) is the
//! worker for that moment.
//!
//! Phases per epoch:
//!
//! ```text
//! Normal --(new epoch seen)--> Merge --(safe)--> Join --(go)--> Normal
//!           merge overlay, ack            replay stash, done
//! ```

use crate::config::EngineConfig;
use crate::database::Shared;
use crate::metrics::WorkerCounters;
use crate::request::{Request, TxnBody, TxnReceipt};
use crate::stash::StashQueue;
use epochdb_concurrency::{
    CandidateTracker, LocalOverlay, Sampler, TidGenerator, Transaction, TxnContext, TxnOptions,
};
use epochdb_core::{AbortReason, Phase, Tid, TxnError, TxnResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// State only the running transaction touches
#[derive(Debug)]
pub(crate) struct WorkerCore {
    ctx: TxnContext,
    overlay: LocalOverlay,
    tracker: CandidateTracker,
    tids: TidGenerator,
    sampler: Sampler,
    stash: StashQueue,
    /// Epoch transactions run in; moves at the start of join
    epoch: Tid,
}

/// One serial executor
#[derive(Debug)]
pub struct Worker {
    id: u8,
    core: Mutex<WorkerCore>,
    phase: RwLock<Phase>,
    /// Latest epoch whose join this worker finished
    epoch: AtomicU64,
    pub(crate) counters: WorkerCounters,
}

impl Worker {
    pub(crate) fn new(id: u8, config: &EngineConfig) -> Self {
        Self {
            id,
            core: Mutex::new(WorkerCore {
                ctx: TxnContext::with_capacity(32, 16),
                overlay: LocalOverlay::new(),
                tracker: CandidateTracker::new(config.policy()),
                tids: TidGenerator::new(id),
                sampler: Sampler::new(config.sample_rate, id),
                stash: StashQueue::new(config.stash_trigger),
                epoch: Tid::FIRST_EPOCH,
            }),
            phase: RwLock::new(Phase::Normal),
            epoch: AtomicU64::new(Tid::FIRST_EPOCH.raw()),
            counters: WorkerCounters::default(),
        }
    }

    /// Worker index
    pub fn id(&self) -> usize {
        self.id as usize
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    /// Latest epoch whose join this worker finished
    ///
    /// Once [`Database::advance_epoch`](crate::Database::advance_epoch)
    /// returns, every worker reports the new epoch.
    pub fn epoch(&self) -> Tid {
        Tid::from_raw(self.epoch.load(Ordering::Acquire))
    }

    /// Requests currently parked
    pub fn stash_len(&self) -> usize {
        self.counters.parked.load(Ordering::Relaxed)
    }

    /// Run one request
    ///
    /// A request that reads a localized record is parked and `Stashed` is
    /// returned; its outcome arrives later on the request's completion
    /// channel. While the stash queue is full this blocks until the next
    /// epoch frees it.
    pub(crate) fn submit(&self, shared: &Shared, request: Request) -> TxnResult<TxnReceipt> {
        let body = shared
            .registry
            .read()
            .get(request.op)
            .ok_or_else(|| TxnError::NoRetry(format!("unknown operation {}", request.op)))?;

        loop {
            if shared.is_shut_down() {
                return Err(TxnError::NoRetry("database is shut down".into()));
            }
            let mut core = self.core.lock();
            self.transition(shared, &mut core);

            if core.stash.is_full() {
                let seen = core.epoch;
                drop(core);
                warn!(target: "epochdb::worker", worker = self.id, "Stash queue full, waiting for next epoch");
                shared.coordinator.accelerate();
                shared
                    .coordinator
                    .barrier()
                    .wait_for_epoch(seen, shared.config.poll_interval());
                continue;
            }

            let outcome = self.execute(shared, &mut core, &body, &request, Phase::Normal);
            shared.metrics.record(&self.counters, &outcome);
            if let Err(TxnError::Stashed) = outcome {
                let full = core.stash.push(request);
                self.counters.parked.store(core.stash.len(), Ordering::Relaxed);
                if full {
                    debug!(target: "epochdb::worker", worker = self.id, "Stash queue reached its bound");
                    shared.coordinator.accelerate();
                }
            }
            return outcome;
        }
    }

    /// Catch up with the global epoch from the idle poller
    pub(crate) fn poll(&self, shared: &Shared) {
        let barrier = shared.coordinator.barrier();
        while !barrier.is_closed() {
            let seen = self.epoch();
            if shared.coordinator.epoch() > seen {
                let mut core = self.core.lock();
                self.transition(shared, &mut core);
                continue;
            }
            barrier.wait_for_epoch(seen, shared.config.poll_interval());
        }
    }

    fn execute(
        &self,
        shared: &Shared,
        core: &mut WorkerCore,
        body: &TxnBody,
        request: &Request,
        phase: Phase,
    ) -> TxnResult<TxnReceipt> {
        let opts = TxnOptions {
            epoch: core.epoch,
            phase,
            lock_mode: shared.config.lock_mode,
            sampled: core.sampler.next(),
        };
        let mut tx = Transaction::begin(
            &mut core.ctx,
            &shared.store,
            &mut core.overlay,
            &mut core.tracker,
            &mut core.tids,
            opts,
        );
        match body(&mut tx, request) {
            Ok(reply) => {
                let tid = tx.commit()?;
                Ok(TxnReceipt { tid, reply })
            }
            Err(e) => {
                tx.abort();
                Err(e)
            }
        }
    }

    // Move through merge and join if a new epoch is in flight. Returns with
    // the worker back in the normal phase.
    fn transition(&self, shared: &Shared, core: &mut WorkerCore) {
        let target = shared.coordinator.epoch();
        if target <= core.epoch {
            return;
        }
        let barrier = shared.coordinator.barrier();

        *self.phase.write() = Phase::Merge;
        let merged = core.overlay.merge_into(&shared.store);
        barrier.ack(target, &mut core.tracker);
        debug!(
            target: "epochdb::worker",
            worker = self.id,
            epoch = target.epoch_number(),
            merged,
            "Merged"
        );

        barrier.wait_safe(target);
        *self.phase.write() = Phase::Join;
        core.epoch = target;
        self.replay(shared, core);
        self.epoch.store(target.raw(), Ordering::Release);
        barrier.arrive_done(target);

        barrier.wait_go(target);
        *self.phase.write() = Phase::Normal;
    }

    // Rerun parked requests in arrival order, each up to the attempt bound
    fn replay(&self, shared: &Shared, core: &mut WorkerCore) {
        let pending = core.stash.drain();
        self.counters.parked.store(0, Ordering::Relaxed);
        if pending.is_empty() {
            return;
        }
        let max_attempts = shared.config.max_replay_attempts;
        let count = pending.len();
        for request in pending {
            let body = shared.registry.read().get(request.op);
            let outcome = match body {
                None => Err(TxnError::NoRetry(format!("unknown operation {}", request.op))),
                Some(body) => {
                    let mut attempts = 0;
                    loop {
                        attempts += 1;
                        match self.execute(shared, core, &body, &request, Phase::Join) {
                            Err(e) if e.is_retryable() && attempts < max_attempts => continue,
                            Err(e) if e.is_retryable() => {
                                break Err(TxnError::aborted(AbortReason::ReplayExhausted(
                                    attempts,
                                )))
                            }
                            other => break other,
                        }
                    }
                }
            };
            let failed = outcome.is_err();
            if failed {
                warn!(
                    target: "epochdb::worker",
                    worker = self.id,
                    op = request.op,
                    error = ?outcome.as_ref().err(),
                    "Replay did not commit"
                );
            } else {
                shared.metrics.record(&self.counters, &outcome);
            }
            shared.metrics.record_replay(&self.counters, failed);
            request.complete(outcome);
        }
        debug!(target: "epochdb::worker", worker = self.id, count, "Stash replayed");
    }
}
