//! Fixed sizes shared across the store and the executor
//!
//! These are compile-time constants rather than configuration: the key width
//! and shard count are baked into the key layout, and the ranked list bound is
//! part of the record merge semantics.

/// Width of every key in bytes.
pub const KEY_WIDTH: usize = 16;

/// Number of store shards. The first key byte indexes the shard directly.
pub const SHARD_COUNT: usize = 256;

/// Maximum number of entries kept by a ranked list record.
pub const RANKED_LIST_CAPACITY: usize = 10;

/// Maximum number of buffered writes in one transaction.
///
/// Exceeding this is a programming error in the transaction body and halts
/// the worker.
pub const MAX_TXN_WRITES: usize = 256;
