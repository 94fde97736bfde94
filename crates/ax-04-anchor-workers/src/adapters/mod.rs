//! Adapters for the outbound ports.

pub mod entity_store;
pub mod ledger_client;

pub use entity_store::InMemoryEntityStore;
pub use ledger_client::{DryRunLedgerClient, LedgerCall, MockLedgerClient};
