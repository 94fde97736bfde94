//! # Shared Types Crate
//!
//! Domain entities and ports shared by every anchoring subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: jobs, payloads and audit records are defined
//!   here and nowhere else.
//! - **Tagged payloads**: `AnchorPayload` is discriminated by `JobKind`, so a
//!   worker can only match the variant it owns.
//! - **Immutable payloads**: `AnchorJob` exposes its payload read-only; only
//!   the attempt counter moves while the job is queued.

pub mod entities;
pub mod errors;
pub mod kv_store;
pub mod rate_limiter;

pub use entities::*;
pub use errors::*;
pub use kv_store::{BatchOperation, InMemoryKVStore, KeyValueStore};
pub use rate_limiter::RollingWindowLimiter;
