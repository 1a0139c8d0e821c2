//! Epoch engine for epochdb
//!
//! This crate runs transactions on top of the lower layers:
//! - Database: open, submit, register operations, shutdown
//! - Worker: serial executor with overlay, tracker and stash queue
//! - Coordinator + EpochBarrier: epoch advances, merge and join phases,
//!   promotion decisions
//! - EngineConfig / RetryConfig: TOML configuration and retry policy
//! - ops: built-in transaction bodies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod metrics;
pub mod ops;
pub mod request;
pub mod retry;
pub mod stash;
pub mod worker;

pub use barrier::EpochBarrier;
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use coordinator::{Coordinator, EpochReport, Trigger};
pub use database::Database;
pub use error::{EngineError, EngineResult};
pub use metrics::{EngineMetrics, MetricsSnapshot, WorkerSnapshot};
pub use request::{Completion, OpId, OpRegistry, Reply, Request, TxnBody, TxnReceipt};
pub use retry::RetryConfig;
pub use stash::StashQueue;
pub use worker::Worker;
