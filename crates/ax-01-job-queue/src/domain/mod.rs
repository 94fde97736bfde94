//! Queue domain: job states, lanes and retry policy.

pub mod backoff;
pub mod config;
pub mod entry;
pub(crate) mod lane;

pub use backoff::BackoffPolicy;
pub use config::{LaneConfig, QueueConfig};
pub use entry::{
    ClaimOutcome, ClaimedJob, DeadLetter, EnqueueOptions, JobStatus, LeaseToken, NackOutcome,
    QueueStats, ReclaimOutcome,
};
