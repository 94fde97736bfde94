//! Error types for the Anchor Workers subsystem

use ax_01_job_queue::QueueError;
use ax_03_transaction_ledger::LedgerStoreError;
use shared_types::EntityRef;
use thiserror::Error;

/// Failure writing or reading the owning domain entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityStoreError {
    #[error("Entity not found: {0}")]
    NotFound(EntityRef),

    #[error("Entity store unavailable: {0}")]
    Unavailable(String),
}

/// Worker errors.
///
/// Ledger failures are not here: they are an expected outcome of a job and
/// travel as `LedgerError` into `nack`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Transaction ledger error: {0}")]
    Records(#[from] LedgerStoreError),

    #[error("Entity store error: {0}")]
    Entity(#[from] EntityStoreError),

    #[error("Payload encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;
