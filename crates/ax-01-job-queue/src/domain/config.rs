//! Queue configuration: retry policy and per-kind admission limits.

use super::backoff::BackoffPolicy;
use shared_types::JobKind;
use std::collections::HashMap;
use std::time::Duration;

/// Admission limits for one job kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaneConfig {
    /// Maximum jobs in flight at once.
    pub max_in_flight: usize,
    /// Maximum job starts per `rate_window`. Zero disables the window.
    pub rate_max: u32,
    pub rate_window: Duration,
}

impl LaneConfig {
    pub fn new(max_in_flight: usize, rate_max: u32, rate_window: Duration) -> Self {
        Self {
            max_in_flight,
            rate_max,
            rate_window,
        }
    }

    /// Defaults for consensus-log submissions: 5 in flight, 10 per second.
    pub fn consensus_default() -> Self {
        Self::new(5, 10, Duration::from_millis(1_000))
    }

    /// Defaults for file-storage uploads: 3 in flight, 10 per minute.
    pub fn file_default() -> Self {
        Self::new(3, 10, Duration::from_millis(60_000))
    }

    /// No concurrency or rate bound.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX, 0, Duration::ZERO)
    }
}

/// Job queue configuration
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Attempts before a job is dead-lettered.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Claim lease length. An unacked job is reclaimable after this.
    pub visibility_timeout: Duration,
    /// Per-kind admission limits.
    pub lanes: HashMap<JobKind, LaneConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let mut lanes = HashMap::new();
        lanes.insert(JobKind::ConsensusSubmit, LaneConfig::consensus_default());
        lanes.insert(JobKind::FileStore, LaneConfig::file_default());
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            visibility_timeout: Duration::from_secs(30),
            lanes,
        }
    }
}

impl QueueConfig {
    /// Limits for a kind; kinds without an entry are unbounded.
    pub fn lane(&self, kind: JobKind) -> LaneConfig {
        self.lanes
            .get(&kind)
            .cloned()
            .unwrap_or_else(LaneConfig::unbounded)
    }

    pub fn with_lane(mut self, kind: JobKind, lane: LaneConfig) -> Self {
        self.lanes.insert(kind, lane);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Configuration for tests: immediate retries, no admission limits.
    pub fn for_testing() -> Self {
        let mut lanes = HashMap::new();
        for kind in JobKind::ALL {
            lanes.insert(kind, LaneConfig::unbounded());
        }
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::none(),
            visibility_timeout: Duration::from_secs(30),
            lanes,
        }
    }
}
