//! # Key Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `tx:rec:<seq>` | JSON `TransactionRecord` |
//! | `tx:own:<entity_type>:<id>:<seq>` | record key |
//! | `tx:req:<user>:<seq>` | record key |
//! | `tx:hash:<content_hash>:<seq>` | record key |
//!
//! Numbers are zero-padded to 20 digits so byte order equals append order.

use shared_types::{ContentHash, EntityRef, UserId};

pub const RECORD_PREFIX: &str = "tx:rec:";

pub fn record_key(seq: u64) -> Vec<u8> {
    format!("{RECORD_PREFIX}{seq:020}").into_bytes()
}

/// Sequence number encoded in a record key.
pub fn parse_record_seq(key: &[u8]) -> Option<u64> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix(RECORD_PREFIX)?
        .parse()
        .ok()
}

pub fn owner_prefix(owner: &EntityRef) -> Vec<u8> {
    format!("tx:own:{}:{:020}:", owner.entity_type.as_str(), owner.id).into_bytes()
}

pub fn requester_prefix(requester: UserId) -> Vec<u8> {
    format!("tx:req:{:020}:", requester.0).into_bytes()
}

pub fn hash_prefix(hash: &ContentHash) -> Vec<u8> {
    format!("tx:hash:{}:", hash.to_hex()).into_bytes()
}

pub fn index_key(prefix: &[u8], seq: u64) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(format!("{seq:020}").as_bytes());
    key
}
