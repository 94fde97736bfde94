//! Driving Ports (API - Inbound)
//!
//! The queue contract consumed by producers and worker pools.

use crate::domain::{
    ClaimOutcome, DeadLetter, EnqueueOptions, JobStatus, LeaseToken, NackOutcome, QueueStats,
    ReclaimOutcome,
};
use crate::error::QueueResult;
use async_trait::async_trait;
use shared_types::{AnchorRequest, JobId, JobKind, LedgerError};
use std::time::Duration;

/// Job Queue API
#[async_trait]
pub trait JobQueueApi: Send + Sync {
    /// Accept a job. Fails with `Unavailable` when the backing store is
    /// unreachable; nothing is queued in that case.
    async fn enqueue(&self, request: AnchorRequest, options: EnqueueOptions) -> QueueResult<JobId>;

    /// Accept several jobs in one atomic store write.
    async fn enqueue_batch(
        &self,
        requests: Vec<AnchorRequest>,
        options: EnqueueOptions,
    ) -> QueueResult<Vec<JobId>>;

    /// Hand at most one job of `kind` to the caller.
    ///
    /// Increments the job's attempt count. A job is never held by two
    /// leases at once.
    async fn claim(&self, kind: JobKind) -> QueueResult<ClaimOutcome>;

    /// Terminal success. The job is removed.
    async fn ack(&self, lease: &LeaseToken) -> QueueResult<()>;

    /// Failed attempt. Reschedules with backoff or dead-letters.
    async fn nack(&self, lease: &LeaseToken, error: &LedgerError) -> QueueResult<NackOutcome>;

    /// Give a claim back (shutdown). The attempt stays counted; a job
    /// released on its final attempt is dead-lettered.
    async fn release(&self, lease: &LeaseToken) -> QueueResult<ReclaimOutcome>;

    /// Return jobs with expired leases to the ready set, dead-lettering
    /// those with no attempts left.
    async fn reclaim_expired(&self) -> QueueResult<Vec<ReclaimOutcome>>;

    async fn status(&self, job_id: JobId) -> Option<JobStatus>;

    async fn stats(&self, kind: JobKind) -> QueueStats;

    async fn pause(&self, kind: JobKind);

    async fn resume(&self, kind: JobKind);

    async fn dead_letters(&self, kind: Option<JobKind>) -> Vec<DeadLetter>;

    /// Operator requeue from the dead-letter set, with attempts reset.
    async fn requeue_dead_letter(&self, job_id: JobId) -> QueueResult<()>;

    /// Delete dead letters older than `older_than`. Returns how many went.
    async fn purge_dead_letters(&self, older_than: Duration) -> QueueResult<usize>;

    /// Wait until work may be available or `max_wait` elapses.
    async fn wait_for_work(&self, max_wait: Duration);
}
