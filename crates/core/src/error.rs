//! Transaction outcome taxonomy
//!
//! Every transaction ends in exactly one of: commit, [`TxnError::Aborted`]
//! (the caller may retry), [`TxnError::Stashed`] (the engine retries it at the
//! next join), [`TxnError::NotFound`] or [`TxnError::NoRetry`].
//! We use `thiserror` for the `Display` and `Error` implementations.

use crate::types::Key;
use thiserror::Error;

/// Result type alias for transaction operations
pub type TxnResult<T> = std::result::Result<T, TxnError>;

/// Why a transaction was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// A write lock was held by another transaction at commit
    #[error("write lock on {0} is held")]
    WriteLocked(Key),

    /// A record was locked when it was read
    #[error("record {0} was locked during read")]
    ReadLocked(Key),

    /// A record read earlier changed before commit
    #[error("record {0} changed since it was read")]
    StaleRead(Key),

    /// A record observed as absent was created before commit
    #[error("record {0} was created since it was read as absent")]
    Phantom(Key),

    /// A stashed request failed to commit within the replay budget
    #[error("replay gave up after {0} attempts")]
    ReplayExhausted(u32),
}

/// Transaction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    /// The key has no record
    #[error("key not found: {0}")]
    NotFound(Key),

    /// Conflict with a concurrent transaction; all effects were undone
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// What conflicted
        reason: AbortReason,
    },

    /// The transaction touched a localized record and was deferred
    #[error("transaction stashed until the next join")]
    Stashed,

    /// Permanent failure; retrying will not help
    #[error("transaction failed: {0}")]
    NoRetry(String),
}

impl TxnError {
    /// Shorthand for an abort with the given reason
    pub fn aborted(reason: AbortReason) -> Self {
        TxnError::Aborted { reason }
    }

    /// Whether an immediate retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxnError::Aborted { .. })
    }

    /// Whether the failure was caused by a concurrent transaction
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TxnError::Aborted {
                reason: AbortReason::WriteLocked(_)
                    | AbortReason::ReadLocked(_)
                    | AbortReason::StaleRead(_)
                    | AbortReason::Phantom(_)
            }
        )
    }
}
