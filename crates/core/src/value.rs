//! Value types for epochdb
//!
//! This module defines:
//! - Value: payload of overwrite records
//! - RecordKind: the four mergeable record variants
//! - RecordValue: the contents of a record
//! - Delta: an update that merges into a record of the matching kind
//!
//! ## Merge rules
//!
//! - Counter: deltas add
//! - Max: deltas take the maximum; a new record starts at 0
//! - Overwrite: the delta with the highest commit stamp wins
//! - RankedList: entries merge into a descending list capped at 10
//!
//! Counter, Max and RankedList merges commute, which is what lets a worker
//! buffer them locally for a localized record and fold them in later.

use crate::error::{TxnError, TxnResult};
use crate::ranked::{self, RankedEntry, RankedList};
use crate::types::Tid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of an overwrite record
///
/// Float equality follows IEEE-754 semantics (`NaN != NaN`), and values of
/// different types are never equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Bytes value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

/// Record variant tag, fixed when the record is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Commutative sum
    Counter,
    /// Commutative maximum
    Max,
    /// Last writer (by commit stamp) wins
    Overwrite,
    /// Bounded descending top-K list
    RankedList,
}

impl RecordKind {
    /// The value a freshly created record of this kind holds
    pub fn initial(self) -> RecordValue {
        match self {
            RecordKind::Counter => RecordValue::Counter(0),
            RecordKind::Max => RecordValue::Max(0),
            RecordKind::Overwrite => RecordValue::Overwrite {
                value: Value::Null,
                stamp: Tid::ZERO,
            },
            RecordKind::RankedList => RecordValue::RankedList(RankedList::new()),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Counter => "counter",
            RecordKind::Max => "max",
            RecordKind::Overwrite => "overwrite",
            RecordKind::RankedList => "ranked_list",
        };
        f.write_str(name)
    }
}

/// Contents of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordValue {
    /// Running sum
    Counter(i64),
    /// Running maximum
    Max(i64),
    /// Latest value and the commit stamp that wrote it
    Overwrite {
        /// Current value
        value: Value,
        /// Stamp of the write that produced `value`
        stamp: Tid,
    },
    /// Descending list of at most 10 entries
    RankedList(RankedList),
}

impl RecordValue {
    /// The variant tag
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordValue::Counter(_) => RecordKind::Counter,
            RecordValue::Max(_) => RecordKind::Max,
            RecordValue::Overwrite { .. } => RecordKind::Overwrite,
            RecordValue::RankedList(_) => RecordKind::RankedList,
        }
    }

    /// Merge a delta into this value
    ///
    /// `stamp` orders overwrites: a put applies only if its stamp is at least
    /// the stamp already stored. Fails without modifying the value when the
    /// delta belongs to another kind.
    pub fn apply(&mut self, delta: &Delta, stamp: Tid) -> TxnResult<()> {
        match (self, delta) {
            (RecordValue::Counter(n), Delta::Add(d)) => *n = n.wrapping_add(*d),
            (RecordValue::Max(n), Delta::Max(d)) => {
                if *d > *n {
                    *n = *d;
                }
            }
            (RecordValue::Overwrite { value, stamp: cur }, Delta::Put(v)) => {
                if stamp >= *cur {
                    *value = v.clone();
                    *cur = stamp;
                }
            }
            (RecordValue::RankedList(list), Delta::Insert(e)) => ranked::insert(list, *e),
            (RecordValue::RankedList(list), Delta::Splice(incoming)) => {
                *list = ranked::merge(list, incoming);
            }
            (this, delta) => return Err(kind_mismatch(this.kind(), delta.kind())),
        }
        Ok(())
    }

    /// Get the sum if this is a counter
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            RecordValue::Counter(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the maximum if this is a max record
    pub fn as_max(&self) -> Option<i64> {
        match self {
            RecordValue::Max(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the integer held by a counter or max record
    pub fn as_int(&self) -> Option<i64> {
        self.as_counter().or_else(|| self.as_max())
    }

    /// Get the current value if this is an overwrite record
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RecordValue::Overwrite { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Get the entries if this is a ranked list
    pub fn as_list(&self) -> Option<&[RankedEntry]> {
        match self {
            RecordValue::RankedList(l) => Some(l),
            _ => None,
        }
    }
}

/// An update to a record
///
/// `Insert` and `Splice` both target ranked lists: `Insert` adds one entry,
/// `Splice` merges a pre-sorted list (what an overlay accumulates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    /// Add to a counter
    Add(i64),
    /// Raise a max record
    Max(i64),
    /// Replace an overwrite record's value
    Put(Value),
    /// Insert one ranked list entry
    Insert(RankedEntry),
    /// Merge a sorted list of entries
    Splice(RankedList),
}

impl Delta {
    /// The record kind this delta applies to
    pub fn kind(&self) -> RecordKind {
        match self {
            Delta::Add(_) => RecordKind::Counter,
            Delta::Max(_) => RecordKind::Max,
            Delta::Put(_) => RecordKind::Overwrite,
            Delta::Insert(_) | Delta::Splice(_) => RecordKind::RankedList,
        }
    }

    /// Fold a later delta into this one
    ///
    /// Afterwards applying `self` once has the same effect as applying the
    /// old `self` followed by `next`. For puts the later value replaces the
    /// earlier one; the caller tracks the stamp.
    pub fn absorb(&mut self, next: Delta) -> TxnResult<()> {
        if let Delta::Insert(first) = *self {
            if next.kind() == RecordKind::RankedList {
                let mut list = RankedList::new();
                ranked::insert(&mut list, first);
                *self = Delta::Splice(list);
            }
        }
        match (self, next) {
            (Delta::Add(a), Delta::Add(b)) => *a = a.wrapping_add(b),
            (Delta::Max(a), Delta::Max(b)) => *a = (*a).max(b),
            (Delta::Put(a), Delta::Put(b)) => *a = b,
            (Delta::Splice(list), Delta::Insert(e)) => ranked::insert(list, e),
            (Delta::Splice(list), Delta::Splice(other)) => *list = ranked::merge(list, &other),
            (this, next) => return Err(kind_mismatch(this.kind(), next.kind())),
        }
        Ok(())
    }
}

fn kind_mismatch(record: RecordKind, delta: RecordKind) -> TxnError {
    TxnError::NoRetry(format!("{} delta applied to {} record", delta, record))
}
