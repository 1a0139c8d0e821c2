//! Storage layer for epochdb
//!
//! This crate implements the in-memory record store:
//! - VersionLock: single-word optimistic lock carrying the record version
//! - Record: typed mergeable cell with a version lock and a localized flag
//! - Store: 256-shard map from key to record, plus the localized key set
//!
//! The store knows nothing about transactions; the concurrency crate drives
//! the version locks and decides what to read and apply.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod store;
pub mod version_lock;

pub use record::Record;
pub use store::{CandidateChange, Store};
pub use version_lock::{LockWord, VersionLock};
