//! Concurrency layer for epochdb
//!
//! This crate implements the per-worker transaction machinery:
//! - TxnContext: reusable read-set / write-set buffers
//! - Transaction: OCC lock / validate / apply commit, phase-aware
//! - LocalOverlay: pending deltas for localized records
//! - CandidateTracker: sampled contention statistics and localization decisions
//! - TidGenerator: epoch-major commit tokens
//! - Sampler: jittered sampling countdown

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod candidates;
pub mod context;
pub mod overlay;
pub mod sampler;
pub mod tid;
pub mod transaction;

pub use candidates::{CandidatePolicy, CandidateTracker, Decision, DemotionHistory, KeyStat};
pub use context::TxnContext;
pub use overlay::LocalOverlay;
pub use sampler::Sampler;
pub use tid::TidGenerator;
pub use transaction::{Transaction, TxnOptions};
