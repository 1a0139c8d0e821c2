//! Client-side retry of aborted transactions
//!
//! Only `Aborted` outcomes are worth resubmitting: they mean a concurrent
//! commit held a lock or changed something this transaction read. A stashed
//! request is retried by its own worker at the next join, and `NotFound` /
//! `NoRetry` would fail the same way again.
//!
//! Between attempts the submitter backs off exponentially. A zero base delay
//! turns the backoff into a plain `yield_now`, which suits short transactions
//! on a busy key better than sleeping.

use epochdb_core::TxnError;
use std::time::Duration;

/// How [`Database::submit_with_retry`](crate::Database::submit_with_retry)
/// resubmits aborted transactions
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new().with_max_retries(5);
/// db.submit_with_retry(0, request, config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Resubmissions after the first attempt (0 = submit once)
    pub max_retries: usize,
    /// Backoff before the first resubmission, doubled for each later one
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 20,
        }
    }
}

impl RetryConfig {
    /// Three retries with 1ms..20ms backoff
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit once; an abort is returned to the caller
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry up to `max_retries` times, yielding instead of sleeping
    pub fn spinning(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Set the number of resubmissions
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the backoff cap
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Whether the outcome of attempt `attempt` (0-based) should be resubmitted
    pub(crate) fn should_retry(&self, error: &TxnError, attempt: usize) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }

    /// Backoff after failed attempt `attempt`
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u64 << attempt.min(63);
        let ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    pub(crate) fn wait(&self, attempt: usize) {
        let delay = self.backoff(attempt);
        if delay.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(delay);
        }
    }
}
