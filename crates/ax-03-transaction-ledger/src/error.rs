//! Error types for the Transaction Ledger Store

use shared_types::KVStoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerStoreError {
    /// Backing store failed.
    #[error("Ledger store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Stored bytes could not be decoded.
    #[error("Corrupted record at {key}: {message}")]
    Corrupted { key: String, message: String },

    /// An index entry points at a record that does not exist.
    #[error("Dangling index entry {key}")]
    DanglingIndex { key: String },
}

impl From<KVStoreError> for LedgerStoreError {
    fn from(err: KVStoreError) -> Self {
        match err {
            KVStoreError::Corrupted { key, message } => Self::Corrupted { key, message },
            other => Self::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

pub type LedgerStoreResult<T> = Result<T, LedgerStoreError>;
