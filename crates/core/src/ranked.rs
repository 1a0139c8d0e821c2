//! Bounded ranked lists
//!
//! A ranked list keeps at most [`RANKED_LIST_CAPACITY`] entries sorted by
//! `order`, descending. Insertion is a linear scan (the list is tiny), and two
//! lists merge with a single bounded pass over both inputs.

use crate::limits::RANKED_LIST_CAPACITY;
use crate::types::Key;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One entry of a ranked list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Sort key; larger orders rank first
    pub order: i64,
    /// The entity this entry refers to
    pub key: Key,
    /// Caller-defined payload (e.g. the amount of a bid)
    pub value: i64,
}

impl RankedEntry {
    /// Create an entry
    pub fn new(order: i64, key: Key, value: i64) -> Self {
        Self { order, key, value }
    }
}

/// Inline storage for a ranked list
pub type RankedList = SmallVec<[RankedEntry; RANKED_LIST_CAPACITY]>;

/// Insert one entry into a descending list, keeping at most K entries
///
/// The entry goes in front of the first entry with a strictly smaller order,
/// so among equal orders earlier insertions rank first.
pub fn insert(list: &mut RankedList, entry: RankedEntry) {
    let pos = list
        .iter()
        .position(|e| e.order < entry.order)
        .unwrap_or(list.len());
    if pos >= RANKED_LIST_CAPACITY {
        return;
    }
    list.insert(pos, entry);
    list.truncate(RANKED_LIST_CAPACITY);
}

/// Merge two descending lists into a new list of at most K entries
///
/// Neither input is re-sorted. On equal orders the entry from `incoming` is
/// taken first.
pub fn merge(current: &[RankedEntry], incoming: &[RankedEntry]) -> RankedList {
    let mut out = RankedList::new();
    let (mut c, mut i) = (0, 0);
    while out.len() < RANKED_LIST_CAPACITY {
        let next = match (current.get(c), incoming.get(i)) {
            (Some(a), Some(b)) if a.order > b.order => {
                c += 1;
                *a
            }
            (_, Some(b)) => {
                i += 1;
                *b
            }
            (Some(a), None) => {
                c += 1;
                *a
            }
            (None, None) => break,
        };
        out.push(next);
    }
    out
}
