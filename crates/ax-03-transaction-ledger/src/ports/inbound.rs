//! Driving Ports (API - Inbound)

use crate::domain::CostSummary;
use crate::error::LedgerStoreResult;
use shared_types::{ContentHash, EntityRef, RecordStatus, TransactionRecord, UserId};

/// Transaction Ledger Store API
///
/// Insert-only. There is deliberately no update or delete operation.
pub trait TransactionLedgerApi: Send + Sync {
    /// Append a record. The record and all its index entries are written
    /// in one atomic batch.
    fn append(&self, record: TransactionRecord) -> LedgerStoreResult<()>;

    /// Records for an owning entity, oldest first.
    fn query_by_owner(&self, owner: &EntityRef) -> LedgerStoreResult<Vec<TransactionRecord>>;

    /// Records triggered by a user, oldest first.
    fn query_by_requester(&self, requester: UserId) -> LedgerStoreResult<Vec<TransactionRecord>>;

    /// Records for identical content, oldest first.
    fn query_by_content_hash(&self, hash: &ContentHash)
        -> LedgerStoreResult<Vec<TransactionRecord>>;

    /// Every record with `status`, oldest first. Full scan.
    fn query_by_status(&self, status: RecordStatus) -> LedgerStoreResult<Vec<TransactionRecord>>;

    /// Spend and outcome totals. Full scan.
    fn cost_summary(&self) -> LedgerStoreResult<CostSummary>;

    fn record_count(&self) -> LedgerStoreResult<usize>;
}
