//! Driving Ports (API - Inbound)

use crate::domain::CacheStats;
use shared_types::{CachedAnchor, ContentHash};

/// Content-addressed memo of successful anchors.
///
/// Never the system of record: a miss only costs a redundant ledger call.
/// Concurrent writers may race; the last write wins, which is harmless
/// because equal hashes anchor equal content.
pub trait ResultCacheApi: Send + Sync {
    fn get(&self, hash: &ContentHash) -> Option<CachedAnchor>;

    fn put(&self, hash: ContentHash, anchor: CachedAnchor);

    /// Drop one entry (operator invalidation).
    fn invalidate(&self, hash: &ContentHash) -> bool;

    fn clear(&self);

    fn stats(&self) -> CacheStats;
}
