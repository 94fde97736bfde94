//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The queue persists through the shared key-value port. Any backend that
//! honours `atomic_batch_write` and ordered `prefix_scan` will do.

pub use shared_types::kv_store::{BatchOperation, KeyValueStore};
