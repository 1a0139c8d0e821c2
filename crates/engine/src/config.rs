//! Engine configuration via `epochdb.toml`
//!
//! Every field has a serde default, so a config file only needs the settings
//! it changes. `epoch_interval_ms = 0` selects manual mode: epochs advance
//! only on [`Database::advance_epoch`](crate::Database::advance_epoch),
//! accelerate requests and shutdown.

use crate::error::{EngineError, EngineResult};
use epochdb_concurrency::CandidatePolicy;
use epochdb_core::{LockMode, SHARD_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "epochdb.toml";

/// Engine configuration
///
/// # Example
///
/// ```toml
/// workers = 8
/// sample_rate = 1000
/// epoch_interval_ms = 20
/// lock_mode = "optimistic"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker executors (1..=256)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// One transaction in roughly this many is sampled; 0 or 1 samples all
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u64,
    /// Score above which a key is promoted to localized mode
    #[serde(default = "default_promote_ratio")]
    pub promote_ratio: f64,
    /// Weight of a conflict relative to a write in the score
    #[serde(default = "default_conflict_weight")]
    pub conflict_weight: f64,
    /// Sampled stashes per stats interval above which a key is demoted
    #[serde(default = "default_demote_stash_threshold")]
    pub demote_stash_threshold: f64,
    /// Minimum sampled writes plus conflicts before promotion
    #[serde(default = "default_min_evidence")]
    pub min_evidence: f64,
    /// Threshold multiplier while no key is localized
    #[serde(default = "default_first_promotion_factor")]
    pub first_promotion_factor: f64,
    /// Promotion decisions run every this many epoch ticks
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    /// Stash queue bound per worker
    #[serde(default = "default_stash_trigger")]
    pub stash_trigger: usize,
    /// Attempts per stashed transaction at join
    #[serde(default = "default_max_replay_attempts")]
    pub max_replay_attempts: u32,
    /// Epoch timer period; 0 = manual
    #[serde(default = "default_epoch_interval_ms")]
    pub epoch_interval_ms: u64,
    /// Idle worker poll period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Commit-time lock discipline
    #[serde(default)]
    pub lock_mode: LockMode,
}

fn default_workers() -> usize {
    4
}

fn default_sample_rate() -> u64 {
    1000
}

fn default_promote_ratio() -> f64 {
    CandidatePolicy::default().promote_ratio
}

fn default_conflict_weight() -> f64 {
    CandidatePolicy::default().conflict_weight
}

fn default_demote_stash_threshold() -> f64 {
    CandidatePolicy::default().demote_stash_threshold
}

fn default_min_evidence() -> f64 {
    CandidatePolicy::default().min_evidence
}

fn default_first_promotion_factor() -> f64 {
    CandidatePolicy::default().first_promotion_factor
}

fn default_stats_interval() -> u64 {
    10
}

fn default_stash_trigger() -> usize {
    100_000
}

fn default_max_replay_attempts() -> u32 {
    10
}

fn default_epoch_interval_ms() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            sample_rate: default_sample_rate(),
            promote_ratio: default_promote_ratio(),
            conflict_weight: default_conflict_weight(),
            demote_stash_threshold: default_demote_stash_threshold(),
            min_evidence: default_min_evidence(),
            first_promotion_factor: default_first_promotion_factor(),
            stats_interval: default_stats_interval(),
            stash_trigger: default_stash_trigger(),
            max_replay_attempts: default_max_replay_attempts(),
            epoch_interval_ms: default_epoch_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_mode: LockMode::default(),
        }
    }
}

impl EngineConfig {
    /// A manual-mode config: no epoch timer, every transaction sampled
    ///
    /// Epochs move only when asked to, which makes promotion and replay
    /// observable step by step.
    pub fn manual(workers: usize) -> Self {
        Self::default()
            .with_workers(workers)
            .with_epoch_interval_ms(0)
            .with_sample_rate(1)
            .with_stats_interval(1)
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the sampling rate
    pub fn with_sample_rate(mut self, rate: u64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the promotion threshold
    pub fn with_promote_ratio(mut self, ratio: f64) -> Self {
        self.promote_ratio = ratio;
        self
    }

    /// Set the threshold multiplier for the first promotion
    pub fn with_first_promotion_factor(mut self, factor: f64) -> Self {
        self.first_promotion_factor = factor;
        self
    }

    /// Set the stats interval
    pub fn with_stats_interval(mut self, ticks: u64) -> Self {
        self.stats_interval = ticks;
        self
    }

    /// Set the stash queue bound
    pub fn with_stash_trigger(mut self, bound: usize) -> Self {
        self.stash_trigger = bound;
        self
    }

    /// Set the replay attempt bound
    pub fn with_max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = attempts;
        self
    }

    /// Set the epoch timer period (0 = manual)
    pub fn with_epoch_interval_ms(mut self, ms: u64) -> Self {
        self.epoch_interval_ms = ms;
        self
    }

    /// Set the lock discipline
    pub fn with_lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Thresholds for the candidate tracker
    pub fn policy(&self) -> CandidatePolicy {
        CandidatePolicy {
            promote_ratio: self.promote_ratio,
            conflict_weight: self.conflict_weight,
            demote_stash_threshold: self.demote_stash_threshold,
            min_evidence: self.min_evidence,
            first_promotion_factor: self.first_promotion_factor,
        }
    }

    /// Epoch timer period, `None` in manual mode
    pub fn epoch_interval(&self) -> Option<Duration> {
        (self.epoch_interval_ms > 0).then(|| Duration::from_millis(self.epoch_interval_ms))
    }

    /// Idle worker poll period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first offending field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.workers == 0 || self.workers > SHARD_COUNT {
            return Err(EngineError::Config(format!(
                "workers must be in 1..={}, got {}",
                SHARD_COUNT, self.workers
            )));
        }
        if self.stats_interval == 0 {
            return Err(EngineError::Config("stats_interval must be positive".into()));
        }
        if self.stash_trigger == 0 {
            return Err(EngineError::Config("stash_trigger must be positive".into()));
        }
        if self.max_replay_attempts == 0 {
            return Err(EngineError::Config(
                "max_replay_attempts must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::Config("poll_interval_ms must be positive".into()));
        }
        if self.promote_ratio.is_nan() || self.promote_ratio <= 0.0 {
            return Err(EngineError::Config(format!(
                "promote_ratio must be positive, got {}",
                self.promote_ratio
            )));
        }
        if self.first_promotion_factor.is_nan() || self.first_promotion_factor < 1.0 {
            return Err(EngineError::Config(format!(
                "first_promotion_factor must be at least 1, got {}",
                self.first_promotion_factor
            )));
        }
        if self.conflict_weight.is_nan() || self.conflict_weight < 0.0 {
            return Err(EngineError::Config(format!(
                "conflict_weight must be non-negative, got {}",
                self.conflict_weight
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# epochdb engine configuration

# Worker executors, one transaction stream each (1..=256)
workers = 4

# Sample about one transaction in this many for contention stats (1 = all)
sample_rate = 1000

# Promotion: a key whose score (conflicts * conflict_weight + writes) /
# (reads + stashes) exceeds promote_ratio, with at least min_evidence sampled
# writes plus conflicts, switches to localized mode.
promote_ratio = 2.0
conflict_weight = 1.0
min_evidence = 2.0

# While nothing is localized the threshold is promote_ratio times this
first_promotion_factor = 1.33

# Demotion: sampled stashes per stats interval above this demote a key
demote_stash_threshold = 100.0

# Promotion decisions run every stats_interval epoch ticks
stats_interval = 10

# Per-worker stash queue bound; reaching it forces an early epoch
stash_trigger = 100000

# Attempts per stashed transaction before it is reported aborted
max_replay_attempts = 10

# Epoch timer in milliseconds (0 = manual: advance_epoch() only)
epoch_interval_ms = 20

# Idle worker poll period in milliseconds
poll_interval_ms = 2

# Commit lock discipline: "optimistic", "blocking" or "unlocked"
lock_mode = "optimistic"
"#
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> EngineResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> EngineResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_correctly() {
        let config = EngineConfig::from_toml_str(EngineConfig::default_toml()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            "workers = 2\nepoch_interval_ms = 0\nlock_mode = \"blocking\"\n",
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.epoch_interval(), None);
        assert_eq!(config.lock_mode, LockMode::Blocking);
        assert_eq!(config.sample_rate, 1000);
    }

    #[test]
    fn invalid_lock_mode_rejected() {
        let err = EngineConfig::from_toml_str("lock_mode = \"pessimistic\"").unwrap_err();
        assert!(matches!(err, EngineError::Toml(_)));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(EngineConfig::default().with_workers(0).validate().is_err());
        assert!(EngineConfig::default().with_workers(257).validate().is_err());
        assert!(EngineConfig::default().with_workers(256).validate().is_ok());
        assert!(EngineConfig::default().with_stats_interval(0).validate().is_err());
        assert!(EngineConfig::default().with_stash_trigger(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_max_replay_attempts(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_promote_ratio(f64::NAN)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_first_promotion_factor(0.5)
            .validate()
            .is_err());
    }

    #[test]
    fn manual_config() {
        let config = EngineConfig::manual(3);
        assert_eq!(config.workers, 3);
        assert_eq!(config.epoch_interval(), None);
        assert_eq!(config.sample_rate, 1);
        assert_eq!(config.stats_interval, 1);
        config.validate().unwrap();
    }

    #[test]
    fn policy_mirrors_fields() {
        let config = EngineConfig::default().with_promote_ratio(3.5);
        let policy = config.policy();
        assert_eq!(policy.promote_ratio, 3.5);
        assert_eq!(policy.min_evidence, config.min_evidence);
        assert_eq!(policy.first_promotion_factor, 1.33);
    }

    #[test]
    fn write_and_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = EngineConfig::manual(2).with_lock_mode(LockMode::Unlocked);
        config.write_to_file(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn write_default_if_missing_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), EngineConfig::default());

        std::fs::write(&path, "workers = 7\n").unwrap();
        EngineConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap().workers, 7);
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = EngineConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
