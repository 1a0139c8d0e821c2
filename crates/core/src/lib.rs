//! Core types for epochdb
//!
//! This crate defines the foundational types shared by every layer:
//! - Key: fixed-width record identifier (first byte selects a shard)
//! - Tid: opaque epoch-major token used as record version and id source
//! - Value / RecordValue / Delta: record contents and the mergeable updates applied to them
//! - RankedEntry: bounded top-K list entries and their merge helpers
//! - Phase / LockMode: worker phase and lock discipline selectors
//! - TxnError: the transaction outcome taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod ranked;
pub mod types;
pub mod value;

pub use error::{AbortReason, TxnError, TxnResult};
pub use limits::{KEY_WIDTH, MAX_TXN_WRITES, RANKED_LIST_CAPACITY, SHARD_COUNT};
pub use ranked::{RankedEntry, RankedList};
pub use types::{Key, LockMode, Phase, Tid};
pub use value::{Delta, RecordKind, RecordValue, Value};
