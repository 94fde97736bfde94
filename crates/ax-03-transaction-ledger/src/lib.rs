//! # ax-03-transaction-ledger
//!
//! System-of-record audit log for every terminal ledger attempt: cost
//! accounting, compliance reporting and reconciliation read from here.
//!
//! ## Invariants
//!
//! - Records are inserted, never updated or deleted.
//! - A record and its owner, requester and content-hash index entries are
//!   written in one atomic batch.
//! - Queries return records in append order.

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::CostSummary;
pub use error::{LedgerStoreError, LedgerStoreResult};
pub use ports::inbound::TransactionLedgerApi;
pub use service::KvTransactionLedger;
