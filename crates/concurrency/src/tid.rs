//! Per-worker commit token generation
//!
//! Tokens carry the current epoch in their high bits and the worker id in
//! their low byte, so tokens from different workers never collide and tokens
//! from later epochs always sort after earlier ones.

use epochdb_core::Tid;

/// Generates strictly increasing tokens for one worker
#[derive(Debug, Clone)]
pub struct TidGenerator {
    worker: u8,
    epoch: Tid,
    sequence: u64,
    last: Tid,
}

impl TidGenerator {
    /// Create a generator for `worker`
    pub fn new(worker: u8) -> Self {
        Self {
            worker,
            epoch: Tid::ZERO,
            sequence: 0,
            last: Tid::ZERO,
        }
    }

    /// The worker id stamped into every token
    pub fn worker(&self) -> u8 {
        self.worker
    }

    /// The most recently issued token
    pub fn last(&self) -> Tid {
        self.last
    }

    /// Issue a fresh token in `epoch`
    pub fn next(&mut self, epoch: Tid) -> Tid {
        let epoch = epoch.epoch();
        if epoch != self.epoch {
            self.epoch = epoch;
            self.sequence = 0;
        }
        self.sequence += 1;
        let candidate = Tid::compose(epoch, self.sequence, self.worker);
        let floor = self.above(self.last);
        self.last = candidate.max(floor);
        self.last
    }

    /// Issue a commit token in `epoch` that is greater than `observed`
    ///
    /// `observed` is the largest version the transaction read or locked.
    pub fn commit(&mut self, epoch: Tid, observed: Tid) -> Tid {
        let t = self.next(epoch);
        if t > observed {
            return t;
        }
        self.last = self.above(observed);
        self.last
    }

    // Smallest token with this worker's id that is greater than `t`
    fn above(&self, t: Tid) -> Tid {
        Tid::from_raw((((t.raw() >> 8) + 1) << 8) | self.worker as u64)
    }
}
