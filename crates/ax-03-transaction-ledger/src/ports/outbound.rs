//! Driven Ports (SPI - Outbound Dependencies)

pub use shared_types::kv_store::{BatchOperation, KeyValueStore};
