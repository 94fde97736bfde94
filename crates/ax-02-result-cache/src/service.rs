//! # Result Cache Service
//!
//! Bounded LRU keyed by content hash with an optional TTL.
//!
//! Expired entries are removed lazily on lookup; they also fall out under
//! LRU pressure like any other entry.

use crate::domain::{CacheConfig, CacheEntry, CacheStats};
use crate::ports::inbound::ResultCacheApi;
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{CachedAnchor, ContentHash};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::trace;

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// LRU + TTL result cache.
pub struct ResultCache {
    config: CacheConfig,
    /// `None` when the cache is disabled (capacity zero).
    entries: Option<Mutex<LruCache<ContentHash, CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        let entries = NonZeroUsize::new(config.capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            config,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// A cache that stores nothing. Every lookup misses.
    pub fn disabled() -> Self {
        Self::new(CacheConfig::new(0, None))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get_at(&self, hash: &ContentHash, now: Instant) -> Option<CachedAnchor> {
        let found = self.entries.as_ref().and_then(|entries| {
            let mut entries = entries.lock();
            let expired = entries
                .peek(hash)
                .map(|entry| entry.is_expired(self.config.ttl, now))?;
            if expired {
                entries.pop(hash);
                self.expired.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entries.get(hash).map(|entry| entry.value.clone())
        });

        match found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(hash = %hash, "[ax-02] Cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    pub fn put_at(&self, hash: ContentHash, anchor: CachedAnchor, now: Instant) {
        let Some(entries) = &self.entries else {
            return;
        };
        entries.lock().put(
            hash,
            CacheEntry {
                value: anchor,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCacheApi for ResultCache {
    fn get(&self, hash: &ContentHash) -> Option<CachedAnchor> {
        self.get_at(hash, now())
    }

    fn put(&self, hash: ContentHash, anchor: CachedAnchor) {
        self.put_at(hash, anchor, now());
    }

    fn invalidate(&self, hash: &ContentHash) -> bool {
        self.entries
            .as_ref()
            .is_some_and(|entries| entries.lock().pop(hash).is_some())
    }

    fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.config.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
