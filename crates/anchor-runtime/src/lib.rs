//! # Anchor Runtime Library
//!
//! Wiring for the ledger anchor service. The entry point is the `main.rs`
//! binary; the modules are exposed for integration tests.
//!
//! - `container/` - configuration and subsystem construction
//! - `adapters/` - storage backends
//! - `handlers/` - event monitor, reconciliation and stats tasks

pub mod adapters;
pub mod container;
pub mod handlers;

pub use container::{AnchorConfig, AnchorContainer, ConfigError, ContainerError};
