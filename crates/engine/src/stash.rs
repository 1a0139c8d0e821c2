//! Per-worker queue of stashed transactions
//!
//! A transaction that reads a localized record during the normal phase is
//! parked here and replayed, in arrival order, when its worker joins the next
//! epoch.

use crate::request::Request;
use std::collections::VecDeque;

/// Bounded FIFO of stashed requests
#[derive(Debug)]
pub struct StashQueue {
    pending: VecDeque<Request>,
    bound: usize,
    total: u64,
}

impl StashQueue {
    /// An empty queue holding at most `bound` requests
    pub fn new(bound: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            bound: bound.max(1),
            total: 0,
        }
    }

    /// Park a request; returns true if the queue is now full
    ///
    /// # Panics
    ///
    /// Panics if the queue is already full. Callers check
    /// [`is_full`](Self::is_full) before running a transaction.
    pub fn push(&mut self, request: Request) -> bool {
        assert!(
            self.pending.len() < self.bound,
            "stash queue overflow: bound {}",
            self.bound
        );
        self.pending.push_back(request);
        self.total += 1;
        self.is_full()
    }

    /// Take every parked request in arrival order
    pub fn drain(&mut self) -> Vec<Request> {
        self.pending.drain(..).collect()
    }

    /// Number of parked requests
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is parked
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True if no more requests fit
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.bound
    }

    /// Capacity
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Requests parked over the queue's lifetime
    pub fn total(&self) -> u64 {
        self.total
    }
}
