//! Producer façade over the job queue.
//!
//! Constructed once at process start and passed to every call site that
//! anchors something. Enqueue only; the request path never waits on the
//! ledger.

use crate::error::{WorkerError, WorkerResult};
use crate::ports::inbound::AnchoringApi;
use ax_01_job_queue::{EnqueueOptions, JobQueueApi};
use async_trait::async_trait;
use shared_bus::{AnchorEvent, EventPublisher};
use shared_types::{
    AnchorPayload, AnchorRequest, ConsensusEnvelope, ConsensusPayload, EntityRef, FilePayload,
    JobId, TopicRef, UserId,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QueueClient {
    queue: Arc<dyn JobQueueApi>,
    events: Arc<dyn EventPublisher>,
    topic: TopicRef,
}

impl QueueClient {
    pub fn new(queue: Arc<dyn JobQueueApi>, events: Arc<dyn EventPublisher>, topic: TopicRef) -> Self {
        Self {
            queue,
            events,
            topic,
        }
    }

    /// Default consensus topic for domain events.
    pub fn topic(&self) -> &TopicRef {
        &self.topic
    }

    fn event_request(&self, envelope: &ConsensusEnvelope) -> WorkerResult<AnchorRequest> {
        let payload = ConsensusPayload::from_envelope(self.topic.clone(), envelope)?;
        Ok(AnchorRequest::new(
            AnchorPayload::ConsensusSubmit(payload),
            envelope.entity,
            envelope.requester_id,
        ))
    }

    async fn announce(&self, job_id: JobId, request: &AnchorRequest) {
        debug!(
            %job_id,
            kind = %request.kind(),
            owner = %request.owner,
            "[ax-04] Anchoring job enqueued"
        );
        self.events
            .publish(AnchorEvent::JobEnqueued {
                job_id,
                kind: request.kind(),
                owner: request.owner,
            })
            .await;
    }
}

#[async_trait]
impl AnchoringApi for QueueClient {
    async fn submit(&self, request: AnchorRequest, options: EnqueueOptions) -> WorkerResult<JobId> {
        let job_id = self
            .queue
            .enqueue(request.clone(), options)
            .await
            .map_err(|err| {
                warn!(owner = %request.owner, error = %err, "[ax-04] Enqueue rejected");
                WorkerError::from(err)
            })?;
        self.announce(job_id, &request).await;
        Ok(job_id)
    }

    async fn anchor_event(&self, envelope: &ConsensusEnvelope) -> WorkerResult<JobId> {
        let request = self.event_request(envelope)?;
        self.submit(request, EnqueueOptions::default()).await
    }

    async fn anchor_events(&self, envelopes: &[ConsensusEnvelope]) -> WorkerResult<Vec<JobId>> {
        let requests = envelopes
            .iter()
            .map(|envelope| self.event_request(envelope))
            .collect::<WorkerResult<Vec<_>>>()?;

        let job_ids = self
            .queue
            .enqueue_batch(requests.clone(), EnqueueOptions::default())
            .await
            .map_err(|err| {
                warn!(count = requests.len(), error = %err, "[ax-04] Batch enqueue rejected");
                WorkerError::from(err)
            })?;

        for (job_id, request) in job_ids.iter().zip(&requests) {
            self.announce(*job_id, request).await;
        }
        Ok(job_ids)
    }

    async fn anchor_file(
        &self,
        owner: EntityRef,
        requester_id: UserId,
        file: FilePayload,
    ) -> WorkerResult<JobId> {
        let request = AnchorRequest::new(AnchorPayload::FileStore(file), owner, requester_id);
        self.submit(request, EnqueueOptions::default()).await
    }
}
