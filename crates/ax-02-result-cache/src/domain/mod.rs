//! Cache configuration, entries and counters.

use shared_types::CachedAnchor;
use std::time::{Duration, Instant};

/// Result cache configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum entries kept; least recently used are evicted first.
    pub capacity: usize,
    /// Entry lifetime. `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Some(Duration::from_secs(3_600)),
        }
    }
}

impl CacheConfig {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self { capacity, ttl }
    }
}

/// A cached anchor with its insertion time.
#[derive(Clone, Debug)]
pub(crate) struct CacheEntry {
    pub value: CachedAnchor,
    pub inserted_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.saturating_duration_since(self.inserted_at) >= ttl)
    }
}

/// Cache statistics for monitoring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
