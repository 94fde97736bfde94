//! # Job Processor
//!
//! The per-job anchoring sequence run by every worker.
//!
//! ```text
//! claimed job
//!     │
//!     ├─ SUCCESS record for this job ──────────────────→ cache put ─→ entity update ─→ ack
//!     │                                                                  ▲
//!     ├─ cache hit ──────────────→ SUCCESS record (reused, cost 0) ──────┤
//!     │                                                                  │
//!     └─ ledger call ─ ok ───────→ SUCCESS record ─→ cache put ──────────┘
//!            │
//!            └─ err ─→ nack ─┬─ rescheduled: JobRetryScheduled
//!                            └─ dead-lettered: FAILED record, JobDeadLettered
//! ```
//!
//! The record is written before the entity so spend is accounted even if
//! the process dies between the two. A redelivered job that already has
//! its SUCCESS record finishes from that record and never reaches the
//! ledger again. The entity update is bounded by the call timeout and never
//! retried against the ledger; a failure there is left to the reconciler.

use crate::domain::{ProcessOutcome, WorkerConfig};
use crate::error::WorkerResult;
use crate::metrics;
use crate::ports::inbound::JobHandler;
use crate::ports::outbound::{DomainEntityStore, LedgerClient};
use crate::service::handlers::{ConsensusSubmitHandler, FileStoreHandler};
use ax_01_job_queue::{ClaimedJob, JobQueueApi, NackOutcome, QueueError, ReclaimOutcome};
use ax_02_result_cache::ResultCacheApi;
use ax_03_transaction_ledger::TransactionLedgerApi;
use shared_bus::{subsystem, AnchorEvent, EventPublisher};
use shared_types::{
    AnchorJob, CachedAnchor, JobKind, LedgerError, LedgerErrorCode, LedgerReceipt,
    TransactionRecord,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything a worker talks to.
#[derive(Clone)]
pub struct AnchorDependencies {
    pub queue: Arc<dyn JobQueueApi>,
    pub ledger: Arc<dyn LedgerClient>,
    pub entities: Arc<dyn DomainEntityStore>,
    pub cache: Arc<dyn ResultCacheApi>,
    pub records: Arc<dyn TransactionLedgerApi>,
    pub events: Arc<dyn EventPublisher>,
}

pub struct JobProcessor {
    deps: AnchorDependencies,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
    config: WorkerConfig,
}

impl JobProcessor {
    pub fn new(deps: AnchorDependencies, config: WorkerConfig) -> Self {
        let mut handlers: HashMap<JobKind, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert(
            JobKind::ConsensusSubmit,
            Arc::new(ConsensusSubmitHandler::new(deps.ledger.clone())),
        );
        handlers.insert(
            JobKind::FileStore,
            Arc::new(FileStoreHandler::new(deps.ledger.clone())),
        );
        Self {
            deps,
            handlers,
            config,
        }
    }

    /// Replace the handler for its kind.
    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn dependencies(&self) -> &AnchorDependencies {
        &self.deps
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one claimed job to a reported outcome.
    ///
    /// `Err` means the outcome could not be reported to the queue; the lease
    /// will expire and the job will be delivered again.
    pub async fn process(&self, claimed: ClaimedJob) -> WorkerResult<ProcessOutcome> {
        let job = &claimed.job;
        debug!(
            job_id = %job.job_id(),
            kind = %job.kind(),
            owner = %job.owner(),
            attempt = job.attempt_count(),
            "[ax-04] Processing job"
        );

        if let Some(record) = self.recorded_success(job) {
            info!(
                job_id = %job.job_id(),
                tx_id = %record.tx_id,
                attempt = job.attempt_count(),
                "[ax-04] Ledger outcome already recorded, finishing without a new call"
            );
            self.cache_success(&record);
            return self.settle(&claimed, &record).await;
        }

        if let Some(cached) = self.deps.cache.get(&job.content_hash()) {
            metrics::record_cache_lookup(job.kind(), true);
            info!(
                job_id = %job.job_id(),
                ledger_id = %cached.ledger_id,
                "[ax-04] Cache hit, reusing ledger reference"
            );
            let record = TransactionRecord::reused(job, &cached);
            self.append_record(&record).await;
            return self.settle(&claimed, &record).await;
        }
        metrics::record_cache_lookup(job.kind(), false);

        match self.call_ledger(job).await {
            Ok(receipt) => {
                let record = TransactionRecord::success(job, &receipt);
                if self.append_record(&record).await {
                    self.cache_success(&record);
                }
                self.settle(&claimed, &record).await
            }
            Err(err) => self.fail(&claimed, err).await,
        }
    }

    async fn call_ledger(&self, job: &AnchorJob) -> Result<LedgerReceipt, LedgerError> {
        let handler = self.handlers.get(&job.kind()).ok_or_else(|| {
            LedgerError::new(
                LedgerErrorCode::MalformedPayload,
                format!("no handler for {}", job.kind()),
            )
        })?;

        let started = tokio::time::Instant::now();
        let result = match tokio::time::timeout(self.config.call_timeout, handler.execute(job)).await
        {
            Ok(result) => result,
            Err(_) => Err(LedgerError::new(
                LedgerErrorCode::Timeout,
                format!("no response within {:?}", self.config.call_timeout),
            )),
        };
        metrics::record_ledger_call(job.kind(), started.elapsed().as_secs_f64());
        result
    }

    /// The SUCCESS record an earlier delivery of this job wrote, if any.
    fn recorded_success(&self, job: &AnchorJob) -> Option<TransactionRecord> {
        match self.deps.records.query_by_owner(&job.owner()) {
            Ok(records) => records
                .into_iter()
                .find(|r| r.job_id == job.job_id() && r.is_success()),
            Err(err) => {
                warn!(
                    job_id = %job.job_id(),
                    error = %err,
                    "[ax-04] Could not check for an earlier outcome"
                );
                None
            }
        }
    }

    /// A cached hash must always be backed by a SUCCESS record.
    fn cache_success(&self, record: &TransactionRecord) {
        if record.tx_type.is_reused() {
            return;
        }
        if let Some(ledger_id) = &record.ledger_id {
            self.deps.cache.put(
                record.content_hash,
                CachedAnchor {
                    ledger_id: ledger_id.clone(),
                    tx_id: record.tx_id.clone(),
                },
            );
        }
    }

    /// Point the owner at the ledger reference, then ack.
    async fn settle(
        &self,
        claimed: &ClaimedJob,
        record: &TransactionRecord,
    ) -> WorkerResult<ProcessOutcome> {
        let job = &claimed.job;
        let ledger_id = record.ledger_id.clone().unwrap_or_default();
        let cache_hit = record.tx_type.is_reused();

        let update = tokio::time::timeout(
            self.config.call_timeout,
            self.deps.entities.set_ledger_reference(job.owner(), &ledger_id),
        )
        .await;
        let failure = match update {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!(
                "entity update gave no answer within {:?}",
                self.config.call_timeout
            )),
        };
        if let Some(reason) = failure {
            warn!(
                job_id = %job.job_id(),
                owner = %job.owner(),
                ledger_id = %ledger_id,
                error = %reason,
                "[ax-04] Entity update failed after ledger success, reconciliation required"
            );
            metrics::record_reconciliation("required");
            self.deps
                .events
                .publish(AnchorEvent::ReconciliationRequired {
                    job_id: job.job_id(),
                    owner: job.owner(),
                    ledger_id: ledger_id.clone(),
                    reason,
                })
                .await;
        }

        match self.deps.queue.ack(&claimed.lease).await {
            Ok(()) => {}
            Err(QueueError::LeaseLost { job_id }) => {
                warn!(%job_id, "[ax-04] Lease lost before ack, job may run again");
                return Ok(ProcessOutcome::LeaseLost);
            }
            Err(err) => {
                error!(job_id = %job.job_id(), error = %err, "[ax-04] Ack failed");
                return Err(err.into());
            }
        }

        info!(
            job_id = %job.job_id(),
            kind = %job.kind(),
            owner = %job.owner(),
            ledger_id = %ledger_id,
            cost = record.cost,
            cache_hit,
            attempt = job.attempt_count(),
            "[ax-04] Job completed"
        );
        self.deps
            .events
            .publish(AnchorEvent::JobCompleted {
                job_id: job.job_id(),
                kind: job.kind(),
                owner: job.owner(),
                tx_id: record.tx_id.clone(),
                ledger_id: ledger_id.clone(),
                cost: record.cost,
                cache_hit,
                attempts: job.attempt_count(),
            })
            .await;

        Ok(ProcessOutcome::Completed {
            ledger_id,
            cache_hit,
        })
    }

    async fn fail(&self, claimed: &ClaimedJob, err: LedgerError) -> WorkerResult<ProcessOutcome> {
        let job = &claimed.job;
        metrics::record_ledger_failure(job.kind(), err.class());
        warn!(
            job_id = %job.job_id(),
            kind = %job.kind(),
            attempt = job.attempt_count(),
            class = err.class().as_str(),
            error = %err,
            "[ax-04] Ledger call failed"
        );

        let outcome = match self.deps.queue.nack(&claimed.lease, &err).await {
            Ok(outcome) => outcome,
            Err(QueueError::LeaseLost { job_id }) => {
                warn!(%job_id, "[ax-04] Lease lost before nack");
                return Ok(ProcessOutcome::LeaseLost);
            }
            Err(queue_err) => return Err(queue_err.into()),
        };

        match outcome {
            NackOutcome::Rescheduled { attempt, delay } => {
                self.deps
                    .events
                    .publish(AnchorEvent::JobRetryScheduled {
                        job_id: job.job_id(),
                        kind: job.kind(),
                        attempt,
                        delay_ms: duration_ms(delay),
                        error_code: err.code.as_str().to_string(),
                    })
                    .await;
                Ok(ProcessOutcome::Rescheduled { attempt, delay })
            }
            NackOutcome::DeadLettered { attempts } => {
                self.record_dead_letter(job, &err).await;
                Ok(ProcessOutcome::DeadLettered { attempts })
            }
        }
    }

    /// Write the FAILED record for a dead-lettered job and announce it.
    pub async fn record_dead_letter(&self, job: &AnchorJob, err: &LedgerError) {
        let record = TransactionRecord::failed(job, err);
        self.append_record(&record).await;

        self.deps
            .events
            .publish(AnchorEvent::JobDeadLettered {
                job_id: job.job_id(),
                kind: job.kind(),
                owner: job.owner(),
                attempts: job.attempt_count(),
                error_code: err.code.as_str().to_string(),
                error: err.message.clone(),
            })
            .await;
    }

    /// Sweep expired leases and purge old dead letters. Jobs that ran out
    /// of attempts while leased get their FAILED record here.
    pub async fn reap_expired(&self) -> WorkerResult<usize> {
        let outcomes = self.deps.queue.reclaim_expired().await?;
        let count = outcomes.len();
        for outcome in outcomes {
            self.settle_abandoned(outcome).await;
        }

        if let Some(retention) = self.config.dead_letter_retention {
            let purged = self.deps.queue.purge_dead_letters(retention).await?;
            if purged > 0 {
                info!(purged, "[ax-04] Old dead letters purged");
            }
        }
        Ok(count)
    }

    /// Follow up a claim that ended without an outcome.
    ///
    /// A dead-lettered job whose ledger call was already recorded as a
    /// success goes back to the queue to finish from that record instead of
    /// getting a FAILED record.
    pub async fn settle_abandoned(&self, outcome: ReclaimOutcome) {
        match outcome {
            ReclaimOutcome::Requeued { job_id, attempts } => {
                info!(%job_id, attempts, "[ax-04] Abandoned claim requeued");
            }
            ReclaimOutcome::DeadLettered(letter) => {
                let job_id = letter.job.job_id();
                if self.recorded_success(&letter.job).is_some() {
                    match self.deps.queue.requeue_dead_letter(job_id).await {
                        Ok(()) => {
                            info!(%job_id, "[ax-04] Dead letter has a recorded success, requeued to finish");
                            return;
                        }
                        Err(err) => warn!(
                            %job_id,
                            error = %err,
                            "[ax-04] Could not requeue dead letter with a recorded success"
                        ),
                    }
                }
                self.record_dead_letter(&letter.job, &letter.error).await;
            }
        }
    }

    /// Append with a short retry. Returns false when the record is lost;
    /// the record is then logged in full and a critical error published.
    async fn append_record(&self, record: &TransactionRecord) -> bool {
        let attempts = self.config.record_write_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.deps.records.append(record.clone()) {
                Ok(()) => return true,
                Err(err) => {
                    warn!(
                        job_id = %record.job_id,
                        attempt,
                        error = %err,
                        "[ax-04] Transaction record write failed"
                    );
                    last_err = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    }
                }
            }
        }

        let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
        metrics::record_unrecorded_outcome();
        error!(
            job_id = %record.job_id,
            record = %serde_json::to_string(record).unwrap_or_default(),
            error = %reason,
            "[ax-04] Transaction record lost"
        );
        self.deps
            .events
            .publish(AnchorEvent::CriticalError {
                subsystem_id: subsystem::TRANSACTION_LEDGER,
                error: format!("record for job {} not written: {}", record.job_id, reason),
            })
            .await;
        false
    }
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
