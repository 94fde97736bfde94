//! # ax-01-job-queue
//!
//! Durable, at-least-once queue for deferred ledger anchoring work.
//!
//! ## Overview
//!
//! - **Write-through persistence** over the shared `KeyValueStore`
//! - **Leases** with a visibility timeout; expired claims are reclaimable
//! - **Retry** with exponential backoff and jitter, bounded by `max_attempts`
//! - **Dead-letter set** for exhausted or fatally failed jobs
//! - **Admission control** per job kind: in-flight cap and rolling rate window
//!
//! ## Architecture
//!
//! ```text
//! Producers ──enqueue──→ Job Queue (1) ──claim──→ Worker Pool (4)
//!                            ↑                        │
//!                            └──── ack / nack ────────┘
//! ```
//!
//! ## Admission
//!
//! | Check | Refusal |
//! |-------|---------|
//! | Lane paused | `ClaimOutcome::Paused` |
//! | Nothing ready | `ClaimOutcome::Empty` |
//! | In-flight cap reached | `ClaimOutcome::Saturated` |
//! | Rate window full | `ClaimOutcome::Throttled { retry_after }` |
//!
//! A refused claim never drops or reorders work.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ax_01_job_queue::{JobQueue, JobQueueApi, QueueConfig, EnqueueOptions};
//!
//! let queue = JobQueue::in_memory(QueueConfig::default());
//! let job_id = queue.enqueue(request, EnqueueOptions::default()).await?;
//!
//! if let ClaimOutcome::Claimed(claimed) = queue.claim(JobKind::FileStore).await? {
//!     queue.ack(&claimed.lease).await?;
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{
    BackoffPolicy, ClaimOutcome, ClaimedJob, DeadLetter, EnqueueOptions, JobStatus, LaneConfig,
    LeaseToken, NackOutcome, QueueConfig, QueueStats, ReclaimOutcome,
};
pub use error::{QueueError, QueueResult};
pub use ports::inbound::JobQueueApi;
pub use service::JobQueue;
