//! Identifier types
//!
//! - Key: 16-byte record identifier; byte 0 selects the store shard
//! - Tid: epoch-major token used as record version and entity id source
//! - Phase: which step of the epoch cycle a worker is in
//! - LockMode: the commit-time lock discipline

use crate::limits::KEY_WIDTH;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width record key
///
/// The store treats keys as opaque bytes except for byte 0, which selects the
/// shard. Callers build keys with one reserved tag byte per entity type via
/// [`Key::from_id`], so that keys for different entity types never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Key([u8; KEY_WIDTH]);

impl Key {
    /// Wrap raw key bytes
    pub const fn from_bytes(bytes: [u8; KEY_WIDTH]) -> Self {
        Self(bytes)
    }

    /// Build a key from an integer id and an entity tag
    ///
    /// The id is stored little-endian in bytes 0..8, so consecutive ids spread
    /// across shards. The tag occupies byte 8.
    pub fn from_id(id: u64, tag: u8) -> Self {
        let mut b = [0u8; KEY_WIDTH];
        b[..8].copy_from_slice(&id.to_le_bytes());
        b[8] = tag;
        Self(b)
    }

    /// Build a key from two 32-bit ids and a tag (e.g. a user/product pair)
    pub fn pair(a: u32, b: u32, tag: u8) -> Self {
        let mut bytes = [0u8; KEY_WIDTH];
        bytes[..4].copy_from_slice(&a.to_le_bytes());
        bytes[4..8].copy_from_slice(&b.to_le_bytes());
        bytes[8] = tag;
        Self(bytes)
    }

    /// Build a key from a short name, truncated to the key width
    pub fn from_name(name: &str) -> Self {
        let mut b = [0u8; KEY_WIDTH];
        let src = name.as_bytes();
        let n = src.len().min(KEY_WIDTH);
        b[..n].copy_from_slice(&src[..n]);
        Self(b)
    }

    /// The integer id stored in bytes 0..8
    pub fn id(&self) -> u64 {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(id)
    }

    /// The entity tag stored in byte 8
    pub fn tag(&self) -> u8 {
        self.0[8]
    }

    /// Index of the store shard owning this key
    #[inline]
    pub fn shard(&self) -> usize {
        self.0[0] as usize
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_WIDTH] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        if tag.is_ascii_graphic() && self.0[9..].iter().all(|b| *b == 0) {
            write!(f, "{}:{}", tag as char, self.id())
        } else {
            for b in &self.0 {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

/// Epoch-major token
///
/// Layout (bit 63 is always clear so a `Tid` can live under a version lock):
///
/// | bits   | field           |
/// |--------|-----------------|
/// | 32..63 | epoch number    |
/// | 8..32  | worker sequence |
/// | 0..8   | worker id       |
///
/// Tids are used as record versions and as unique ids for new entities.
/// Ordering on the raw value is the ordering of commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tid(u64);

impl Tid {
    /// The version of a record that was never committed to
    pub const ZERO: Tid = Tid(0);

    /// Distance between two consecutive epochs
    pub const EPOCH_INCREMENT: u64 = 1 << 32;

    /// The first epoch; the coordinator starts here
    pub const FIRST_EPOCH: Tid = Tid(Self::EPOCH_INCREMENT);

    const EPOCH_MASK: u64 = !(Self::EPOCH_INCREMENT - 1);
    const SEQUENCE_MASK: u64 = 0x00FF_FFFF;

    /// Wrap a raw token
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Build a token from an epoch token, a sequence number and a worker id
    ///
    /// The sequence is truncated to 24 bits.
    pub fn compose(epoch: Tid, sequence: u64, worker: u8) -> Self {
        Self((epoch.0 & Self::EPOCH_MASK) | ((sequence & Self::SEQUENCE_MASK) << 8) | worker as u64)
    }

    /// The epoch part, with the low 32 bits cleared
    pub fn epoch(self) -> Tid {
        Tid(self.0 & Self::EPOCH_MASK)
    }

    /// The epoch number (bits 32..63)
    pub fn epoch_number(self) -> u64 {
        self.0 >> 32
    }

    /// The epoch token following this one
    pub fn next_epoch(self) -> Tid {
        Tid(self.epoch().0 + Self::EPOCH_INCREMENT)
    }

    /// The per-worker sequence part
    pub fn sequence(self) -> u64 {
        (self.0 >> 8) & Self::SEQUENCE_MASK
    }

    /// The worker id part
    pub fn worker(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// The token as an id for a newly created entity
    ///
    /// The worker byte is rotated to the top so that the low byte, which
    /// selects the shard of [`Key::from_id`], follows the sequence.
    pub fn entity_id(self) -> u64 {
        self.0.rotate_right(8)
    }

    /// The smallest token strictly greater than this one
    pub fn successor(self) -> Tid {
        Tid(self.0 + 1)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.epoch_number(), self.sequence(), self.worker())
    }
}

/// Worker phase within the epoch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Executing transactions; localized keys are written through the overlay
    #[default]
    Normal,
    /// Flushing the overlay into the store
    Merge,
    /// Replaying stashed transactions; localized keys are readable
    Join,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Normal => write!(f, "normal"),
            Phase::Merge => write!(f, "merge"),
            Phase::Join => write!(f, "join"),
        }
    }
}

/// Commit-time lock discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Try each write lock once; any contention aborts
    #[default]
    Optimistic,
    /// Lock writes in key order, spinning until each lock is acquired
    Blocking,
    /// No version locks and no validation
    ///
    /// Writes are applied under the record value lock only. Not serializable.
    Unlocked,
}
