//! Contention statistics and localization decisions
//!
//! Each worker samples a fraction of its transactions and counts, per key,
//! reads, writes, conflicts and stashes. A key's score is
//!
//! ```text
//! ratio = (conflict_weight * conflicts + writes) / max(reads + stashes, 1)
//! ```
//!
//! Keys whose score crosses the promotion threshold, and keys that are
//! already localized, are kept in an indexed max-heap: every entry records its
//! own heap position, so a counter change re-heapifies in place in O(log n).
//! Only heaped keys are shipped to the coordinator at a stats boundary.
//!
//! # Decision rules
//!
//! - promote: not localized, ratio > `promote_ratio`, and at least
//!   `min_evidence` sampled writes plus conflicts
//! - first promotion: while nothing is localized, the best key must also
//!   clear `promote_ratio * first_promotion_factor`, since the first
//!   localized key switches every worker into the stash/merge cycle
//! - demotion candidate: localized, and stashes exceed
//!   `demote_stash_threshold`, or ratio < `promote_ratio / 2`, or the key was
//!   not observed at all
//! - demote: a demotion candidate on two consecutive decisions

use epochdb_core::Key;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Thresholds driving promotion and demotion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidatePolicy {
    /// Score above which a key is promoted
    pub promote_ratio: f64,
    /// Weight of a conflict relative to a write
    pub conflict_weight: f64,
    /// Sampled stashes per interval above which a localized key is demoted
    pub demote_stash_threshold: f64,
    /// Minimum sampled writes plus conflicts before a key can be promoted
    pub min_evidence: f64,
    /// Threshold multiplier applied while no key is localized
    pub first_promotion_factor: f64,
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self {
            promote_ratio: 2.0,
            conflict_weight: 1.0,
            demote_stash_threshold: 100.0,
            min_evidence: 2.0,
            first_promotion_factor: 1.33,
        }
    }
}

/// Sampled counters for one key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyStat {
    /// The key
    pub key: Key,
    /// Sampled reads
    pub reads: f64,
    /// Sampled writes
    pub writes: f64,
    /// Sampled conflicts
    pub conflicts: f64,
    /// Sampled stashes
    pub stashes: f64,
    /// Whether the key was localized when last observed
    pub localized: bool,
    heap_pos: Option<usize>,
}

impl KeyStat {
    fn empty(key: Key) -> Self {
        Self {
            key,
            reads: 0.0,
            writes: 0.0,
            conflicts: 0.0,
            stashes: 0.0,
            localized: false,
            heap_pos: None,
        }
    }

    /// Promotion score under `conflict_weight`
    pub fn ratio(&self, conflict_weight: f64) -> f64 {
        (conflict_weight * self.conflicts + self.writes) / (self.reads + self.stashes).max(1.0)
    }

    /// Sampled writes plus conflicts
    pub fn evidence(&self) -> f64 {
        self.writes + self.conflicts
    }
}

/// Outcome of one promotion/demotion decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    /// Keys to localize, highest score first
    pub promote: Vec<Key>,
    /// Keys to return to global mode
    pub demote: Vec<Key>,
}

impl Decision {
    /// True if the decision changes nothing
    pub fn is_empty(&self) -> bool {
        self.promote.is_empty() && self.demote.is_empty()
    }
}

/// Demotion candidates carried between decisions
#[derive(Debug, Clone, Default)]
pub struct DemotionHistory {
    pending: FxHashSet<Key>,
}

impl DemotionHistory {
    /// Keys that were demotion candidates at the last decision
    pub fn pending(&self) -> impl Iterator<Item = &Key> {
        self.pending.iter()
    }
}

/// Per-worker sampled statistics with an indexed max-heap
#[derive(Debug, Clone)]
pub struct CandidateTracker {
    policy: CandidatePolicy,
    stats: Vec<KeyStat>,
    index: FxHashMap<Key, usize>,
    heap: Vec<usize>,
}

impl CandidateTracker {
    /// Create an empty tracker
    pub fn new(policy: CandidatePolicy) -> Self {
        Self {
            policy,
            stats: Vec::new(),
            index: FxHashMap::default(),
            heap: Vec::new(),
        }
    }

    /// The thresholds in use
    pub fn policy(&self) -> &CandidatePolicy {
        &self.policy
    }

    /// Number of keys observed
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// True if nothing was observed
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Number of keys in the heap
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Counters for `key`, if observed
    pub fn get(&self, key: &Key) -> Option<&KeyStat> {
        self.index.get(key).map(|&i| &self.stats[i])
    }

    /// The highest-scoring heaped key
    pub fn peek(&self) -> Option<&KeyStat> {
        self.heap.first().map(|&i| &self.stats[i])
    }

    /// Heaped keys, highest score first
    pub fn ranked(&self) -> Vec<&KeyStat> {
        let mut out: Vec<&KeyStat> = self.heap.iter().map(|&i| &self.stats[i]).collect();
        let cw = self.policy.conflict_weight;
        out.sort_by(|a, b| b.ratio(cw).partial_cmp(&a.ratio(cw)).unwrap_or(Ordering::Equal));
        out
    }

    /// Record a sampled read
    pub fn read(&mut self, key: Key, localized: bool) {
        let i = self.entry(key, |s| s.reads = 1.0, |s| s.reads += 1.0);
        self.touch(i, localized);
    }

    /// Record a sampled committed write
    pub fn write(&mut self, key: Key, localized: bool) {
        let i = self.entry(
            key,
            |s| {
                s.reads = 1.0;
                s.writes = 1.0;
            },
            |s| s.writes += 1.0,
        );
        self.touch(i, localized);
    }

    /// Record a sampled conflict
    pub fn conflict(&mut self, key: Key, localized: bool) {
        let i = self.entry(
            key,
            |s| {
                s.reads = 1.0;
                s.conflicts = 1.0;
            },
            |s| s.conflicts += 1.0,
        );
        self.touch(i, localized);
    }

    /// Record a sampled stash; stashed keys are always heaped
    pub fn stash(&mut self, key: Key) {
        let i = self.entry(key, |s| s.stashes = 1.0, |s| s.stashes += 1.0);
        self.stats[i].localized = true;
        self.update(i);
    }

    /// Record a read of a key the same transaction already wrote
    ///
    /// Reading back one's own write means the transaction needs the real
    /// value, which localization cannot provide; this lowers the score.
    pub fn read_after_write(&mut self, key: Key, localized: bool) {
        let i = self.entry(
            key,
            |s| s.reads = 5.0,
            |s| {
                s.reads += 10.0;
                s.conflicts = (s.conflicts - 1.0).max(0.0);
            },
        );
        if self.stats[i].heap_pos.is_some() {
            self.stats[i].localized |= localized;
            self.update(i);
        } else {
            self.touch(i, localized);
        }
    }

    /// Fold another tracker's heaped keys into this one
    pub fn merge(&mut self, other: CandidateTracker) {
        let CandidateTracker { stats, heap, .. } = other;
        for j in heap {
            let theirs = &stats[j];
            let i = self.entry(theirs.key, |_| {}, |_| {});
            let mine = &mut self.stats[i];
            mine.reads += theirs.reads;
            mine.writes += theirs.writes;
            mine.conflicts += theirs.conflicts;
            mine.stashes += theirs.stashes;
            mine.localized |= theirs.localized;
            self.update(i);
        }
    }

    /// Take the collected statistics, leaving an empty tracker behind
    pub fn harvest(&mut self) -> CandidateTracker {
        std::mem::replace(self, CandidateTracker::new(self.policy))
    }

    /// Decide promotions and demotions from aggregated statistics
    ///
    /// `localized` is the current localized key set. `history` carries
    /// demotion candidates from the previous decision.
    pub fn decide(&self, localized: &[Key], history: &mut DemotionHistory) -> Decision {
        let p = self.policy;
        let current: FxHashSet<Key> = localized.iter().copied().collect();

        let mut promote: Vec<&KeyStat> = self
            .heap
            .iter()
            .map(|&i| &self.stats[i])
            .filter(|s| {
                !current.contains(&s.key)
                    && s.ratio(p.conflict_weight) > p.promote_ratio
                    && s.evidence() >= p.min_evidence
            })
            .collect();
        promote.sort_by(|a, b| {
            b.ratio(p.conflict_weight)
                .partial_cmp(&a.ratio(p.conflict_weight))
                .unwrap_or(Ordering::Equal)
                .then(a.key.cmp(&b.key))
        });
        if localized.is_empty() {
            let first = p.promote_ratio * p.first_promotion_factor;
            if promote.first().map_or(false, |s| s.ratio(p.conflict_weight) <= first) {
                promote.clear();
            }
        }

        let mut candidates = FxHashSet::default();
        for key in localized {
            let weak = match self.get(key) {
                None => true,
                Some(s) => {
                    s.stashes > p.demote_stash_threshold
                        || s.ratio(p.conflict_weight) < p.promote_ratio / 2.0
                }
            };
            if weak {
                candidates.insert(*key);
            }
        }
        let mut demote: Vec<Key> = candidates
            .iter()
            .filter(|k| history.pending.contains(k))
            .copied()
            .collect();
        demote.sort_unstable();
        for k in &demote {
            candidates.remove(k);
        }
        history.pending = candidates;

        Decision {
            promote: promote.into_iter().map(|s| s.key).collect(),
            demote,
        }
    }

    // Find or create the stat for `key`, running `init` on a new entry and
    // `bump` on an existing one
    fn entry(
        &mut self,
        key: Key,
        init: impl FnOnce(&mut KeyStat),
        bump: impl FnOnce(&mut KeyStat),
    ) -> usize {
        match self.index.get(&key) {
            Some(&i) => {
                bump(&mut self.stats[i]);
                i
            }
            None => {
                let mut s = KeyStat::empty(key);
                init(&mut s);
                let i = self.stats.len();
                self.stats.push(s);
                self.index.insert(key, i);
                i
            }
        }
    }

    // Heap the stat if it is interesting, re-heapify if already heaped
    fn touch(&mut self, i: usize, localized: bool) {
        let s = &mut self.stats[i];
        s.localized |= localized;
        if s.heap_pos.is_some()
            || s.localized
            || s.ratio(self.policy.conflict_weight) > self.policy.promote_ratio
        {
            self.update(i);
        }
    }

    fn update(&mut self, i: usize) {
        match self.stats[i].heap_pos {
            Some(pos) => {
                let pos = self.sift_up(pos);
                self.sift_down(pos);
            }
            None => {
                let pos = self.heap.len();
                self.heap.push(i);
                self.stats[i].heap_pos = Some(pos);
                self.sift_up(pos);
            }
        }
    }

    fn higher(&self, a: usize, b: usize) -> bool {
        let cw = self.policy.conflict_weight;
        self.stats[self.heap[a]].ratio(cw) > self.stats[self.heap[b]].ratio(cw)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.stats[self.heap[a]].heap_pos = Some(a);
        self.stats[self.heap[b]].heap_pos = Some(b);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.higher(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let n = self.heap.len();
        loop {
            let (l, r) = (2 * pos + 1, 2 * pos + 2);
            let mut best = pos;
            if l < n && self.higher(l, best) {
                best = l;
            }
            if r < n && self.higher(r, best) {
                best = r;
            }
            if best == pos {
                return;
            }
            self.swap(pos, best);
            pos = best;
        }
    }
}

impl Default for CandidateTracker {
    fn default() -> Self {
        Self::new(CandidatePolicy::default())
    }
}
