//! Transaction sampling for contention statistics
//!
//! Only one transaction in roughly `rate` feeds the candidate tracker. The
//! countdown is re-armed with a random jitter minus the worker id so that
//! workers do not sample in lockstep.

use rand::Rng;

const JITTER: u64 = 100;

/// Countdown sampler
#[derive(Debug, Clone)]
pub struct Sampler {
    rate: u64,
    worker: u64,
    countdown: u64,
    sampled: u64,
}

impl Sampler {
    /// Create a sampler that samples about one in `rate` transactions
    ///
    /// A rate of 0 or 1 samples every transaction, without jitter.
    pub fn new(rate: u64, worker: u8) -> Self {
        Self {
            rate,
            worker: worker as u64,
            // first sample lands a worker-dependent distance in
            countdown: worker as u64,
            sampled: 0,
        }
    }

    /// Advance the countdown; true if this transaction is sampled
    pub fn next(&mut self) -> bool {
        if self.rate <= 1 {
            self.sampled += 1;
            return true;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        let jitter = rand::thread_rng().gen_range(0..JITTER);
        self.countdown = (self.rate + jitter).saturating_sub(self.worker).max(1);
        self.sampled += 1;
        true
    }

    /// Number of transactions sampled so far
    pub fn sampled(&self) -> u64 {
        self.sampled
    }
}
