//! epochdb - in-memory transactional record store with hot-key localization
//!
//! Records are typed, mergeable cells (counters, maxima, overwrites, bounded
//! ranked lists) updated by optimistic transactions. Keys that attract heavy
//! write contention are switched into a localized mode where each worker
//! buffers its deltas privately; the buffers are merged at epoch boundaries.
//!
//! # Quick Start
//!
//! ```ignore
//! use epochdb::{ops, Database, EngineConfig, Key, Request, RetryConfig};
//!
//! let db = Database::open(EngineConfig::default())?;
//! let hits = Key::from_name("hits");
//! db.submit_with_retry(
//!     0,
//!     Request::new(ops::INCREMENT).with_key(hits).with_amount(1),
//!     RetryConfig::default(),
//! )?;
//! db.shutdown();
//! ```
//!
//! # Architecture
//!
//! - `epochdb-core`: keys, tokens, record values, errors
//! - `epochdb-storage`: version locks, records, the sharded store
//! - `epochdb-concurrency`: transactions, overlays, contention tracking
//! - `epochdb-engine`: workers, epochs, the database facade

pub use epochdb_concurrency::{CandidatePolicy, Transaction};
pub use epochdb_core::{
    AbortReason, Delta, Key, LockMode, Phase, RankedEntry, RecordKind, RecordValue, Tid, TxnError,
    TxnResult, Value,
};
pub use epochdb_engine::{
    ops, Database, EngineConfig, EngineError, EngineResult, EpochReport, MetricsSnapshot, OpId,
    Reply, Request, RetryConfig, TxnReceipt, Worker,
};
pub use epochdb_storage::Store;
