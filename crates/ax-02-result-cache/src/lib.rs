//! # ax-02-result-cache
//!
//! Content-hash → ledger identifier memo that lets workers skip a second
//! ledger call for content already anchored.
//!
//! ## Policy
//!
//! | Concern | Choice |
//! |---------|--------|
//! | Bound | LRU, `capacity` entries (default 10 000) |
//! | Expiry | TTL per entry (default 1 hour), checked on lookup |
//! | Races | Last writer wins |
//! | Loss | Degrades cost, never correctness |
//!
//! Entries are only written after a SUCCESS transaction record for the
//! same content hash has been appended.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{CacheConfig, CacheStats};
pub use ports::inbound::ResultCacheApi;
pub use service::ResultCache;
