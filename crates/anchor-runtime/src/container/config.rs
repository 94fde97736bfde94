//! # Anchor Configuration
//!
//! Runtime parameters for every subsystem, from defaults overridden by
//! `AX_*` environment variables.
//!
//! ## Validation Rules
//!
//! - Attempts, worker counts and the cache capacity must be non-zero
//! - The claim lease must outlive a single ledger call, otherwise a slow
//!   call lets a second worker claim the same job
//! - `AX_BACKOFF_BASE_MS` must not exceed `AX_BACKOFF_MAX_MS`

use ax_01_job_queue::{BackoffPolicy, LaneConfig, QueueConfig};
use ax_02_result_cache::CacheConfig;
use ax_04_anchor_workers::WorkerConfig;
use shared_types::{JobKind, TopicRef};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid {expected}")]
    Unparsable {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("backoff base {base:?} exceeds backoff max {max:?}")]
    BackoffOrder { base: Duration, max: Duration },

    #[error("backoff jitter {0} is outside 0.0..=1.0")]
    Jitter(f64),

    #[error("visibility timeout {visibility:?} must exceed ledger call timeout {call:?}")]
    LeaseShorterThanCall { visibility: Duration, call: Duration },

    #[error("consensus topic id must not be empty")]
    EmptyTopic,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorConfig {
    /// Attempts before a job is dead-lettered.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub backoff_jitter: f64,
    /// Claim lease length.
    pub visibility_timeout: Duration,

    pub consensus_concurrency: usize,
    pub consensus_rate_max: u32,
    pub consensus_rate_window: Duration,
    pub file_concurrency: usize,
    pub file_rate_max: u32,
    pub file_rate_window: Duration,

    pub cache_capacity: usize,
    /// `None` when `AX_CACHE_TTL_SECS=0`.
    pub cache_ttl: Option<Duration>,

    pub poll_interval: Duration,
    pub drain_timeout: Duration,
    pub ledger_timeout: Duration,
    pub reap_interval: Duration,
    /// `None` when `AX_DEAD_LETTER_RETENTION_SECS=0`.
    pub dead_letter_retention: Option<Duration>,
    pub reconcile_interval: Duration,
    /// Period of queue depth sampling and metrics file export.
    pub stats_interval: Duration,

    /// RocksDB directory, used with the `rocksdb` feature.
    pub data_dir: PathBuf,
    /// Refuse to start below this much free space on the data volume.
    pub min_disk_space_percent: u8,
    /// Default consensus topic.
    pub topic_id: String,
    /// Prometheus text export target. Unset disables the export.
    pub metrics_file: Option<PathBuf>,
    /// Fee reported by the dry-run ledger client.
    pub dry_run_cost: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        let queue = QueueConfig::default();
        let consensus = LaneConfig::consensus_default();
        let file = LaneConfig::file_default();
        let cache = CacheConfig::default();
        let workers = WorkerConfig::default();
        Self {
            max_attempts: queue.max_attempts,
            backoff_base: queue.backoff.base,
            backoff_max: queue.backoff.max,
            backoff_jitter: queue.backoff.jitter,
            visibility_timeout: Duration::from_secs(60),
            consensus_concurrency: consensus.max_in_flight,
            consensus_rate_max: consensus.rate_max,
            consensus_rate_window: consensus.rate_window,
            file_concurrency: file.max_in_flight,
            file_rate_max: file.rate_max,
            file_rate_window: file.rate_window,
            cache_capacity: cache.capacity,
            cache_ttl: cache.ttl,
            poll_interval: workers.poll_interval,
            drain_timeout: workers.drain_timeout,
            ledger_timeout: workers.call_timeout,
            reap_interval: workers.reap_interval,
            dead_letter_retention: workers.dead_letter_retention,
            reconcile_interval: Duration::from_secs(3_600),
            stats_interval: Duration::from_secs(15),
            data_dir: PathBuf::from("./data"),
            min_disk_space_percent: 5,
            topic_id: "0.0.0".to_string(),
            metrics_file: None,
            dry_run_cost: 5,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Unparsable {
            var,
            value,
            expected,
        }),
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse(lookup, var, "millisecond count", default.as_millis() as u64).map(Duration::from_millis)
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse(lookup, var, "second count", default.as_secs()).map(Duration::from_secs)
}

impl AnchorConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Unset variables keep their
    /// defaults; set but unparsable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let lookup = &lookup;

        let cache_ttl_secs = parse(
            lookup,
            "AX_CACHE_TTL_SECS",
            "second count",
            d.cache_ttl.map_or(0, |ttl| ttl.as_secs()),
        )?;

        let retention_secs = parse(
            lookup,
            "AX_DEAD_LETTER_RETENTION_SECS",
            "second count",
            d.dead_letter_retention.map_or(0, |r| r.as_secs()),
        )?;

        Ok(Self {
            max_attempts: parse(lookup, "AX_MAX_ATTEMPTS", "attempt count", d.max_attempts)?,
            backoff_base: millis(lookup, "AX_BACKOFF_BASE_MS", d.backoff_base)?,
            backoff_max: millis(lookup, "AX_BACKOFF_MAX_MS", d.backoff_max)?,
            backoff_jitter: parse(lookup, "AX_BACKOFF_JITTER", "ratio", d.backoff_jitter)?,
            visibility_timeout: secs(lookup, "AX_VISIBILITY_TIMEOUT_SECS", d.visibility_timeout)?,
            consensus_concurrency: parse(
                lookup,
                "AX_CONSENSUS_CONCURRENCY",
                "worker count",
                d.consensus_concurrency,
            )?,
            consensus_rate_max: parse(
                lookup,
                "AX_CONSENSUS_RATE_MAX",
                "job count",
                d.consensus_rate_max,
            )?,
            consensus_rate_window: millis(
                lookup,
                "AX_CONSENSUS_RATE_WINDOW_MS",
                d.consensus_rate_window,
            )?,
            file_concurrency: parse(lookup, "AX_FILE_CONCURRENCY", "worker count", d.file_concurrency)?,
            file_rate_max: parse(lookup, "AX_FILE_RATE_MAX", "job count", d.file_rate_max)?,
            file_rate_window: millis(lookup, "AX_FILE_RATE_WINDOW_MS", d.file_rate_window)?,
            cache_capacity: parse(lookup, "AX_CACHE_CAPACITY", "entry count", d.cache_capacity)?,
            cache_ttl: (cache_ttl_secs > 0).then(|| Duration::from_secs(cache_ttl_secs)),
            poll_interval: millis(lookup, "AX_POLL_INTERVAL_MS", d.poll_interval)?,
            drain_timeout: secs(lookup, "AX_DRAIN_TIMEOUT_SECS", d.drain_timeout)?,
            ledger_timeout: secs(lookup, "AX_LEDGER_TIMEOUT_SECS", d.ledger_timeout)?,
            reap_interval: millis(lookup, "AX_REAP_INTERVAL_MS", d.reap_interval)?,
            dead_letter_retention: (retention_secs > 0).then(|| Duration::from_secs(retention_secs)),
            reconcile_interval: secs(lookup, "AX_RECONCILE_INTERVAL_SECS", d.reconcile_interval)?,
            stats_interval: secs(lookup, "AX_STATS_INTERVAL_SECS", d.stats_interval)?,
            data_dir: lookup("AX_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            min_disk_space_percent: parse(
                lookup,
                "AX_MIN_DISK_SPACE_PERCENT",
                "percentage",
                d.min_disk_space_percent,
            )?,
            topic_id: lookup("AX_TOPIC_ID").unwrap_or(d.topic_id),
            metrics_file: lookup("AX_METRICS_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            dry_run_cost: parse(lookup, "AX_DRY_RUN_COST", "tinybar amount", d.dry_run_cost)?,
        })
    }

    /// Check cross-field constraints before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("AX_MAX_ATTEMPTS"));
        }
        if self.consensus_concurrency == 0 {
            return Err(ConfigError::Zero("AX_CONSENSUS_CONCURRENCY"));
        }
        if self.file_concurrency == 0 {
            return Err(ConfigError::Zero("AX_FILE_CONCURRENCY"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Zero("AX_CACHE_CAPACITY"));
        }
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::Zero("AX_RECONCILE_INTERVAL_SECS"));
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::Zero("AX_STATS_INTERVAL_SECS"));
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Zero("AX_REAP_INTERVAL_MS"));
        }
        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::BackoffOrder {
                base: self.backoff_base,
                max: self.backoff_max,
            });
        }
        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(ConfigError::Jitter(self.backoff_jitter));
        }
        if self.visibility_timeout <= self.ledger_timeout {
            return Err(ConfigError::LeaseShorterThanCall {
                visibility: self.visibility_timeout,
                call: self.ledger_timeout,
            });
        }
        if self.topic_id.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(BackoffPolicy::new(
                self.backoff_base,
                self.backoff_max,
                self.backoff_jitter,
            ))
            .with_visibility_timeout(self.visibility_timeout)
            .with_lane(
                JobKind::ConsensusSubmit,
                LaneConfig::new(
                    self.consensus_concurrency,
                    self.consensus_rate_max,
                    self.consensus_rate_window,
                ),
            )
            .with_lane(
                JobKind::FileStore,
                LaneConfig::new(self.file_concurrency, self.file_rate_max, self.file_rate_window),
            )
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_capacity, self.cache_ttl)
    }

    /// One worker per in-flight slot of each lane.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_workers(JobKind::ConsensusSubmit, self.consensus_concurrency)
            .with_workers(JobKind::FileStore, self.file_concurrency)
            .with_call_timeout(self.ledger_timeout)
            .with_poll_interval(self.poll_interval)
            .with_drain_timeout(self.drain_timeout)
            .with_reap_interval(self.reap_interval)
            .with_dead_letter_retention(self.dead_letter_retention)
    }

    pub fn topic(&self) -> TopicRef {
        TopicRef(self.topic_id.clone())
    }
}
