//! Error types for the Job Queue subsystem

use shared_types::{JobId, KVStoreError};
use thiserror::Error;

/// Job queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Backing store unreachable. Queue state was not changed.
    #[error("Queue unavailable: {reason}")]
    Unavailable { reason: String },

    /// No job with this id is known to the queue.
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    /// The lease was reclaimed or superseded; the caller no longer owns the job.
    #[error("Lease lost for job {job_id}")]
    LeaseLost { job_id: JobId },

    /// Operator requeue on a job that is not dead-lettered.
    #[error("Job {job_id} is not in the dead-letter set")]
    NotDeadLettered { job_id: JobId },

    /// Persisted job could not be decoded during recovery.
    #[error("Corrupted queue entry {key}: {message}")]
    Corrupted { key: String, message: String },
}

impl From<KVStoreError> for QueueError {
    fn from(err: KVStoreError) -> Self {
        match err {
            KVStoreError::Corrupted { key, message } => Self::Corrupted { key, message },
            other => Self::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
