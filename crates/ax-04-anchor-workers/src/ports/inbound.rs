//! Driving Ports (API - Inbound)

use crate::error::WorkerResult;
use ax_01_job_queue::EnqueueOptions;
use async_trait::async_trait;
use shared_types::{
    AnchorJob, AnchorRequest, ConsensusEnvelope, EntityRef, FilePayload, JobId, JobKind,
    LedgerError, LedgerReceipt, UserId,
};

/// Producer-facing anchoring API.
///
/// Producers only enqueue. A queue outage is returned to the caller, who
/// owns the fallback policy; it is never swallowed here.
#[async_trait]
pub trait AnchoringApi: Send + Sync {
    async fn submit(&self, request: AnchorRequest, options: EnqueueOptions) -> WorkerResult<JobId>;

    /// Anchor a domain event on the default consensus topic.
    async fn anchor_event(&self, envelope: &ConsensusEnvelope) -> WorkerResult<JobId>;

    /// Anchor several domain events in one atomic enqueue.
    async fn anchor_events(&self, envelopes: &[ConsensusEnvelope]) -> WorkerResult<Vec<JobId>>;

    async fn anchor_file(
        &self,
        owner: EntityRef,
        requester_id: UserId,
        file: FilePayload,
    ) -> WorkerResult<JobId>;
}

/// Executes the ledger call for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn execute(&self, job: &AnchorJob) -> Result<LedgerReceipt, LedgerError>;
}
