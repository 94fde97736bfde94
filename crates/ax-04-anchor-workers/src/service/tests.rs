use super::*;
use crate::adapters::{InMemoryEntityStore, MockLedgerClient};
use crate::domain::{ProcessOutcome, WorkerConfig};
use crate::error::WorkerError;
use crate::ports::inbound::AnchoringApi;
use ax_01_job_queue::{
    ClaimedJob, EnqueueOptions, JobQueue, JobQueueApi, JobStatus, LaneConfig, QueueConfig,
    QueueError,
};
use ax_02_result_cache::{ResultCache, ResultCacheApi};
use ax_03_transaction_ledger::{KvTransactionLedger, TransactionLedgerApi};
use shared_bus::{AnchorEvent, EventFilter, InMemoryEventBus, Subscription};
use shared_types::{
    AnchorPayload, AnchorRequest, BatchOperation, ConsensusEnvelope, ConsensusEventType,
    ConsensusPayload, ContentHash, EntityRef, FilePayload, InMemoryKVStore, JobId, JobKind,
    KVStoreError, KeyValueStore, LedgerError, LedgerErrorCode, RecordStatus, TopicRef,
    TransactionType, UserId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// FIXTURES
// =============================================================================

struct Harness {
    queue: Arc<JobQueue>,
    ledger: Arc<MockLedgerClient>,
    entities: Arc<InMemoryEntityStore>,
    cache: Arc<ResultCache>,
    records: Arc<KvTransactionLedger>,
    bus: Arc<InMemoryEventBus>,
    processor: Arc<JobProcessor>,
}

impl Harness {
    fn new() -> Self {
        Self::build(
            QueueConfig::for_testing(),
            MockLedgerClient::new(),
            WorkerConfig::default(),
        )
    }

    fn build(queue_config: QueueConfig, ledger: MockLedgerClient, config: WorkerConfig) -> Self {
        let queue = Arc::new(JobQueue::in_memory(queue_config));
        let ledger = Arc::new(ledger);
        let entities = Arc::new(InMemoryEntityStore::new());
        let cache = Arc::new(ResultCache::default());
        let records = Arc::new(KvTransactionLedger::in_memory());
        let bus = Arc::new(InMemoryEventBus::new());
        let deps = AnchorDependencies {
            queue: queue.clone(),
            ledger: ledger.clone(),
            entities: entities.clone(),
            cache: cache.clone(),
            records: records.clone(),
            events: bus.clone(),
        };
        let processor = Arc::new(JobProcessor::new(deps, config));
        Self {
            queue,
            ledger,
            entities,
            cache,
            records,
            bus,
            processor,
        }
    }

    async fn enqueue(&self, request: AnchorRequest) -> JobId {
        self.queue
            .enqueue(request, EnqueueOptions::default())
            .await
            .unwrap()
    }

    async fn claim(&self, kind: JobKind) -> ClaimedJob {
        self.queue.claim(kind).await.unwrap().into_claimed().unwrap()
    }

    async fn run_next(&self, kind: JobKind) -> ProcessOutcome {
        let claimed = self.claim(kind).await;
        self.processor.process(claimed).await.unwrap()
    }

    fn subscribe(&self) -> Subscription {
        self.bus.subscribe(EventFilter::all())
    }
}

fn file(n: u64) -> FilePayload {
    FilePayload::new(
        format!("scan {n}").into_bytes(),
        format!("scan-{n}.pdf"),
        "application/pdf",
    )
}

fn file_request(doc: u64, payload: FilePayload) -> AnchorRequest {
    AnchorRequest::new(
        AnchorPayload::FileStore(payload),
        EntityRef::document(doc),
        UserId(7),
    )
}

fn consensus_request(n: u64) -> AnchorRequest {
    AnchorRequest::new(
        AnchorPayload::ConsensusSubmit(ConsensusPayload::new(
            TopicRef("0.0.5005".into()),
            format!("{{\"event\":{n}}}").into_bytes(),
        )),
        EntityRef::consultation(n),
        UserId(7),
    )
}

fn drain(sub: &mut Subscription) -> Vec<AnchorEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = sub.try_recv() {
        events.push(event);
    }
    events
}

fn busy() -> LedgerError {
    LedgerError::new(LedgerErrorCode::Busy, "node busy")
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// =============================================================================
// PROCESSOR
// =============================================================================

#[tokio::test]
async fn test_success_records_updates_entity_and_caches() {
    let h = Harness::new();
    let mut sub = h.subscribe();
    let payload = file(1);
    let hash = payload.content_hash;
    let job_id = h.enqueue(file_request(1, payload)).await;

    let outcome = h.run_next(JobKind::FileStore).await;

    let ProcessOutcome::Completed {
        ledger_id,
        cache_hit,
    } = outcome
    else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(!cache_hit);

    let records = h.records.query_by_owner(&EntityRef::document(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Success);
    assert_eq!(records[0].cost, 5);
    assert_eq!(records[0].metadata["content_hash"], hash.to_hex());
    assert_eq!(records[0].ledger_id.as_deref(), Some(ledger_id.as_str()));

    assert_eq!(h.cache.get(&hash).unwrap().ledger_id, ledger_id);
    assert_eq!(
        h.entities.reference(&EntityRef::document(1)),
        Some(ledger_id)
    );
    assert_eq!(h.queue.status(job_id).await, None);

    let events = drain(&mut sub);
    assert!(matches!(
        events.last(),
        Some(AnchorEvent::JobCompleted { cost: 5, cache_hit: false, attempts: 1, .. })
    ));
}

#[tokio::test]
async fn test_cache_hit_skips_ledger_call() {
    let h = Harness::new();
    h.enqueue(file_request(1, file(1))).await;
    h.enqueue(file_request(2, file(1))).await;

    let first = h.run_next(JobKind::FileStore).await;
    let second = h.run_next(JobKind::FileStore).await;

    assert!(matches!(first, ProcessOutcome::Completed { cache_hit: false, .. }));
    assert!(matches!(second, ProcessOutcome::Completed { cache_hit: true, .. }));
    assert_eq!(h.ledger.call_count(), 1);

    let reused = h.records.query_by_owner(&EntityRef::document(2)).unwrap();
    assert_eq!(reused.len(), 1);
    assert_eq!(reused[0].tx_type, TransactionType::FileUploadReused);
    assert_eq!(reused[0].cost, 0);
    assert_eq!(
        h.entities.reference(&EntityRef::document(1)),
        h.entities.reference(&EntityRef::document(2))
    );
    assert_eq!(h.records.cost_summary().unwrap().total_cost, 5);
}

#[tokio::test]
async fn test_entity_failure_keeps_record_and_does_not_retry_ledger() {
    let h = Harness::new();
    let mut sub = h.subscribe();
    h.entities.set_failing(true);
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let outcome = h.run_next(JobKind::FileStore).await;

    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
    assert_eq!(h.ledger.call_count(), 1);
    assert_eq!(h.records.record_count().unwrap(), 1);
    assert_eq!(h.queue.status(job_id).await, None);
    assert_eq!(h.entities.reference(&EntityRef::document(1)), None);

    let events = drain(&mut sub);
    assert!(events
        .iter()
        .any(|e| matches!(e, AnchorEvent::ReconciliationRequired { job_id: id, .. } if *id == job_id)));
}

#[tokio::test]
async fn test_transient_failure_reschedules_without_record() {
    let h = Harness::new();
    let mut sub = h.subscribe();
    h.ledger.fail_times(1, busy());
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let outcome = h.run_next(JobKind::FileStore).await;

    assert!(matches!(outcome, ProcessOutcome::Rescheduled { attempt: 1, .. }));
    assert_eq!(h.records.record_count().unwrap(), 0);
    assert_eq!(
        h.queue.status(job_id).await,
        Some(JobStatus::Ready { attempts: 1 })
    );
    let events = drain(&mut sub);
    assert!(events.iter().any(|e| matches!(
        e,
        AnchorEvent::JobRetryScheduled { attempt: 1, error_code, .. } if error_code == "BUSY"
    )));
}

#[tokio::test]
async fn test_transient_twice_then_success_writes_one_record() {
    let h = Harness::new();
    h.ledger.fail_times(2, busy());
    h.enqueue(file_request(1, file(1))).await;

    assert!(matches!(
        h.run_next(JobKind::FileStore).await,
        ProcessOutcome::Rescheduled { attempt: 1, .. }
    ));
    assert!(matches!(
        h.run_next(JobKind::FileStore).await,
        ProcessOutcome::Rescheduled { attempt: 2, .. }
    ));
    let claimed = h.claim(JobKind::FileStore).await;
    assert_eq!(claimed.attempt(), 3);
    assert!(matches!(
        h.processor.process(claimed).await.unwrap(),
        ProcessOutcome::Completed { .. }
    ));

    let records = h.records.query_by_owner(&EntityRef::document(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_success());
    assert_eq!(records[0].metadata["attempts"], 3);
}

#[tokio::test]
async fn test_fatal_failure_dead_letters_at_once() {
    let h = Harness::new();
    let mut sub = h.subscribe();
    h.ledger.always_fail(LedgerError::new(
        LedgerErrorCode::InsufficientPayerBalance,
        "payer account empty",
    ));
    h.enqueue(file_request(1, file(1))).await;

    let outcome = h.run_next(JobKind::FileStore).await;

    assert_eq!(outcome, ProcessOutcome::DeadLettered { attempts: 1 });
    let records = h.records.query_by_owner(&EntityRef::document(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Failed);
    assert!(records[0].tx_id.is_sentinel());
    assert_eq!(records[0].cost, 0);
    assert_eq!(h.entities.write_count(), 0);
    assert_eq!(h.queue.dead_letters(None).await.len(), 1);
    assert!(drain(&mut sub)
        .iter()
        .any(|e| matches!(e, AnchorEvent::JobDeadLettered { attempts: 1, .. })));
}

#[tokio::test]
async fn test_exhausted_retries_write_single_failed_record() {
    let h = Harness::build(
        QueueConfig::for_testing().with_max_attempts(3),
        MockLedgerClient::new(),
        WorkerConfig::default(),
    );
    h.ledger.always_fail(busy());
    h.enqueue(file_request(1, file(1))).await;

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(h.run_next(JobKind::FileStore).await);
    }

    assert_eq!(outcomes[2], ProcessOutcome::DeadLettered { attempts: 3 });
    assert_eq!(h.ledger.call_count(), 3);
    let records = h.records.query_by_owner(&EntityRef::document(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Failed);
    assert_eq!(h.entities.reference(&EntityRef::document(1)), None);
    assert!(h
        .queue
        .claim(JobKind::FileStore)
        .await
        .unwrap()
        .into_claimed()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_call_timeout_counts_as_transient() {
    let h = Harness::build(
        QueueConfig::for_testing(),
        MockLedgerClient::new().with_latency(Duration::from_secs(10)),
        WorkerConfig::default().with_call_timeout(Duration::from_secs(1)),
    );
    let mut sub = h.subscribe();
    h.enqueue(file_request(1, file(1))).await;

    let outcome = h.run_next(JobKind::FileStore).await;

    assert!(matches!(outcome, ProcessOutcome::Rescheduled { attempt: 1, .. }));
    assert!(drain(&mut sub).iter().any(|e| matches!(
        e,
        AnchorEvent::JobRetryScheduled { error_code, .. } if error_code == "TIMEOUT"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_reaper_records_lease_expiry_on_final_attempt() {
    let h = Harness::build(
        QueueConfig::for_testing()
            .with_max_attempts(1)
            .with_visibility_timeout(Duration::from_secs(1)),
        MockLedgerClient::new(),
        WorkerConfig::default(),
    );
    h.enqueue(file_request(1, file(1))).await;
    let _abandoned = h.claim(JobKind::FileStore).await;

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(h.processor.reap_expired().await.unwrap(), 1);

    let failed = h.records.query_by_status(RecordStatus::Failed).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metadata["error_code"], "LEASE_EXPIRED");
}

#[tokio::test(start_paused = true)]
async fn test_late_outcome_after_reclaim_reports_lease_lost() {
    let h = Harness::build(
        QueueConfig::for_testing().with_visibility_timeout(Duration::from_secs(1)),
        MockLedgerClient::new(),
        WorkerConfig::default(),
    );
    let payload = file(1);
    let hash = payload.content_hash;
    let job_id = h.enqueue(file_request(1, payload)).await;
    let stale = h.claim(JobKind::FileStore).await;

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(h.processor.reap_expired().await.unwrap(), 1);

    let outcome = h.processor.process(stale).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::LeaseLost);
    assert!(h.cache.get(&hash).is_some());

    // The redelivery finishes from the recorded success.
    let redelivered = h.run_next(JobKind::FileStore).await;
    assert!(matches!(redelivered, ProcessOutcome::Completed { cache_hit: false, .. }));
    assert_eq!(h.ledger.call_count(), 1);
    assert_eq!(h.queue.status(job_id).await, None);

    let records = h.records.query_by_owner(&EntityRef::document(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_id, job_id);
    assert_eq!(records[0].status, RecordStatus::Success);
    assert_eq!(h.records.cost_summary().unwrap().total_cost, 5);
}

#[tokio::test(start_paused = true)]
async fn test_slow_entity_update_does_not_repeat_ledger_call() {
    let h = Harness::build(
        QueueConfig::for_testing().with_visibility_timeout(Duration::from_secs(2)),
        MockLedgerClient::new(),
        WorkerConfig::default(),
    );
    h.entities.set_latency(Duration::from_secs(5));
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let first = {
        let processor = h.processor.clone();
        let claimed = h.claim(JobKind::FileStore).await;
        tokio::spawn(async move { processor.process(claimed).await })
    };
    let ledger = h.ledger.clone();
    wait_until(|| ledger.call_count() == 1).await;

    // The first worker is stuck on the entity store when its lease runs out.
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(h.processor.reap_expired().await.unwrap(), 1);
    let second = h.run_next(JobKind::FileStore).await;
    assert!(matches!(second, ProcessOutcome::Completed { .. }));

    assert_eq!(first.await.unwrap().unwrap(), ProcessOutcome::LeaseLost);
    assert_eq!(h.ledger.call_count(), 1);
    assert_eq!(h.queue.status(job_id).await, None);
    let records = h.records.query_by_owner(&EntityRef::document(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(h.records.cost_summary().unwrap().total_cost, 5);
    assert!(h.entities.reference(&EntityRef::document(1)).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_entity_update_timeout_requires_reconciliation() {
    let h = Harness::build(
        QueueConfig::for_testing(),
        MockLedgerClient::new(),
        WorkerConfig::default().with_call_timeout(Duration::from_secs(1)),
    );
    let mut sub = h.subscribe();
    h.entities.set_latency(Duration::from_secs(10));
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let outcome = h.run_next(JobKind::FileStore).await;

    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
    assert_eq!(h.queue.status(job_id).await, None);
    assert_eq!(h.entities.reference(&EntityRef::document(1)), None);
    assert!(drain(&mut sub)
        .iter()
        .any(|e| matches!(e, AnchorEvent::ReconciliationRequired { job_id: id, .. } if *id == job_id)));
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_with_recorded_success_is_finished_not_failed() {
    let h = Harness::build(
        QueueConfig::for_testing()
            .with_max_attempts(1)
            .with_visibility_timeout(Duration::from_secs(2)),
        MockLedgerClient::new(),
        WorkerConfig::default(),
    );
    h.entities.set_latency(Duration::from_secs(5));
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let first = {
        let processor = h.processor.clone();
        let claimed = h.claim(JobKind::FileStore).await;
        tokio::spawn(async move { processor.process(claimed).await })
    };
    let ledger = h.ledger.clone();
    wait_until(|| ledger.call_count() == 1).await;

    tokio::time::advance(Duration::from_secs(3)).await;
    h.processor.reap_expired().await.unwrap();
    assert_eq!(
        h.queue.status(job_id).await,
        Some(JobStatus::Ready { attempts: 0 })
    );
    assert!(matches!(
        h.run_next(JobKind::FileStore).await,
        ProcessOutcome::Completed { .. }
    ));
    first.await.unwrap().unwrap();

    assert_eq!(h.ledger.call_count(), 1);
    assert!(h.records.query_by_status(RecordStatus::Failed).unwrap().is_empty());
    assert_eq!(h.records.record_count().unwrap(), 1);
}

#[tokio::test]
async fn test_reaper_purges_old_dead_letters() {
    let h = Harness::build(
        QueueConfig::for_testing(),
        MockLedgerClient::new(),
        WorkerConfig::default().with_dead_letter_retention(Some(Duration::ZERO)),
    );
    h.ledger.always_fail(LedgerError::new(LedgerErrorCode::InvalidSignature, "bad key"));
    h.enqueue(file_request(1, file(1))).await;
    h.run_next(JobKind::FileStore).await;
    assert_eq!(h.queue.dead_letters(None).await.len(), 1);

    h.processor.reap_expired().await.unwrap();

    assert!(h.queue.dead_letters(None).await.is_empty());
    // The audit trail keeps the FAILED record.
    assert_eq!(h.records.query_by_status(RecordStatus::Failed).unwrap().len(), 1);
}

// =============================================================================
// WORKER POOL
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pool_drains_queue() {
    let h = Harness::new();
    for n in 0..6 {
        h.enqueue(file_request(n, file(n))).await;
    }
    for n in 0..4 {
        h.enqueue(consensus_request(n)).await;
    }

    let pool = WorkerPool::new(h.processor.clone());
    pool.start();
    assert!(pool.is_running());

    let records = h.records.clone();
    wait_until(|| records.record_count().unwrap() == 10).await;

    let report = pool.shutdown().await;
    assert!(report.drained);
    assert_eq!(report.released, 0);
    assert!(!pool.is_running());
    assert_eq!(h.ledger.call_count(), 10);
    assert_eq!(h.ledger.max_concurrent_per_content(), 1);
    for kind in JobKind::ALL {
        assert_eq!(h.queue.stats(kind).await.pending(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_unfinished_claims() {
    let h = Harness::build(
        QueueConfig::for_testing(),
        MockLedgerClient::new().with_latency(Duration::from_secs(60)),
        WorkerConfig::default()
            .with_workers(JobKind::ConsensusSubmit, 0)
            .with_workers(JobKind::FileStore, 1)
            .with_call_timeout(Duration::from_secs(120))
            .with_drain_timeout(Duration::from_secs(1)),
    );
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let pool = WorkerPool::new(h.processor.clone());
    pool.start();
    let ledger = h.ledger.clone();
    wait_until(|| ledger.call_count() == 1).await;

    let report = pool.shutdown().await;

    assert!(!report.drained);
    assert_eq!(report.released, 1);
    // The ledger saw the attempt, so it stays counted.
    assert_eq!(
        h.queue.status(job_id).await,
        Some(JobStatus::Ready { attempts: 1 })
    );
    assert_eq!(h.records.record_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_on_final_attempt_dead_letters_released_job() {
    let h = Harness::build(
        QueueConfig::for_testing().with_max_attempts(1),
        MockLedgerClient::new().with_latency(Duration::from_secs(60)),
        WorkerConfig::default()
            .with_workers(JobKind::ConsensusSubmit, 0)
            .with_workers(JobKind::FileStore, 1)
            .with_call_timeout(Duration::from_secs(120))
            .with_drain_timeout(Duration::from_secs(1)),
    );
    let job_id = h.enqueue(file_request(1, file(1))).await;

    let pool = WorkerPool::new(h.processor.clone());
    pool.start();
    let ledger = h.ledger.clone();
    wait_until(|| ledger.call_count() == 1).await;
    let report = pool.shutdown().await;

    assert_eq!(report.released, 1);
    assert!(matches!(
        h.queue.status(job_id).await,
        Some(JobStatus::DeadLettered { attempts: 1, .. })
    ));
    let failed = h.records.query_by_status(RecordStatus::Failed).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metadata["error_code"], "RELEASED");
}

#[tokio::test(start_paused = true)]
async fn test_pool_respects_rate_window() {
    let window = Duration::from_secs(1);
    let h = Harness::build(
        QueueConfig::for_testing().with_lane(JobKind::FileStore, LaneConfig::new(10, 2, window)),
        MockLedgerClient::new(),
        WorkerConfig::default().with_workers(JobKind::ConsensusSubmit, 0),
    );
    for n in 0..6 {
        h.enqueue(file_request(n, file(n))).await;
    }

    let pool = WorkerPool::new(h.processor.clone());
    pool.start();
    let records = h.records.clone();
    wait_until(|| records.record_count().unwrap() == 6).await;
    pool.shutdown().await;

    let calls = h.ledger.calls();
    assert_eq!(calls.len(), 6);
    for pair in calls.windows(3) {
        assert!(pair[2].at.duration_since(pair[0].at) >= window);
    }
}

// =============================================================================
// QUEUE CLIENT
// =============================================================================

struct SwitchableStore {
    inner: InMemoryKVStore,
    down: AtomicBool,
}

impl SwitchableStore {
    fn check(&self) -> Result<(), KVStoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(KVStoreError::IOError {
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for SwitchableStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.check()?;
        self.inner.get(key)
    }
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.check()?;
        self.inner.put(key, value)
    }
    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.check()?;
        self.inner.delete(key)
    }
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.check()?;
        self.inner.atomic_batch_write(operations)
    }
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        self.check()?;
        self.inner.prefix_scan(prefix)
    }
}

fn envelope(n: u64) -> ConsensusEnvelope {
    ConsensusEnvelope::new(
        ConsensusEventType::ConsultationCreated,
        EntityRef::consultation(n),
        UserId(3),
        ContentHash::of(format!("consultation {n}").as_bytes()),
    )
}

#[tokio::test]
async fn test_anchor_event_enqueues_envelope() {
    let h = Harness::new();
    let mut sub = h.subscribe();
    let client = QueueClient::new(h.queue.clone(), h.bus.clone(), TopicRef("0.0.5005".into()));
    let event = envelope(4);

    let job_id = client.anchor_event(&event).await.unwrap();

    let claimed = h.claim(JobKind::ConsensusSubmit).await;
    assert_eq!(claimed.job_id(), job_id);
    assert_eq!(claimed.job.owner(), EntityRef::consultation(4));
    let AnchorPayload::ConsensusSubmit(payload) = claimed.job.payload() else {
        panic!("expected consensus payload");
    };
    assert_eq!(payload.topic, *client.topic());
    let decoded: ConsensusEnvelope = serde_json::from_slice(&payload.message).unwrap();
    assert_eq!(decoded, event);

    assert!(matches!(
        drain(&mut sub).first(),
        Some(AnchorEvent::JobEnqueued { kind: JobKind::ConsensusSubmit, .. })
    ));
}

#[tokio::test]
async fn test_anchor_events_batch() {
    let h = Harness::new();
    let client = QueueClient::new(h.queue.clone(), h.bus.clone(), TopicRef("0.0.5005".into()));

    let ids = client
        .anchor_events(&[envelope(1), envelope(2), envelope(3)])
        .await
        .unwrap();

    assert_eq!(ids.len(), 3);
    assert_eq!(h.queue.stats(JobKind::ConsensusSubmit).await.ready, 3);
}

#[tokio::test]
async fn test_anchor_file_enqueues_file_job() {
    let h = Harness::new();
    let client = QueueClient::new(h.queue.clone(), h.bus.clone(), TopicRef("0.0.5005".into()));

    let job_id = client
        .anchor_file(EntityRef::document(8), UserId(2), file(8))
        .await
        .unwrap();

    assert_eq!(
        h.queue.status(job_id).await,
        Some(JobStatus::Ready { attempts: 0 })
    );
}

#[tokio::test]
async fn test_unavailable_queue_surfaces_to_producer() {
    let store = Arc::new(SwitchableStore {
        inner: InMemoryKVStore::new(),
        down: AtomicBool::new(false),
    });
    let queue = Arc::new(JobQueue::open(store.clone(), QueueConfig::for_testing()).unwrap());
    let bus = Arc::new(InMemoryEventBus::new());
    let mut sub = bus.subscribe(EventFilter::all());
    let client = QueueClient::new(queue.clone(), bus.clone(), TopicRef("0.0.5005".into()));

    store.down.store(true, Ordering::SeqCst);
    let result = client
        .anchor_file(EntityRef::document(1), UserId(1), file(1))
        .await;

    assert!(matches!(
        result,
        Err(WorkerError::Queue(QueueError::Unavailable { .. }))
    ));
    assert_eq!(queue.stats(JobKind::FileStore).await.pending(), 0);
    assert!(drain(&mut sub).is_empty());
}

// =============================================================================
// RECONCILER
// =============================================================================

#[tokio::test]
async fn test_reconciler_repairs_missing_reference() {
    let h = Harness::new();
    let mut sub = h.subscribe();
    h.entities.set_failing(true);
    h.enqueue(file_request(1, file(1))).await;
    let ProcessOutcome::Completed { ledger_id, .. } = h.run_next(JobKind::FileStore).await else {
        panic!("expected completion");
    };
    h.entities.set_failing(false);
    drain(&mut sub);

    let reconciler = Reconciler::new(h.records.clone(), h.entities.clone(), h.bus.clone());
    let report = reconciler.run_once().await.unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.repaired, 1);
    assert_eq!(
        h.entities.reference(&EntityRef::document(1)),
        Some(ledger_id)
    );
    assert!(matches!(
        drain(&mut sub).as_slice(),
        [AnchorEvent::EntityReconciled { .. }]
    ));

    let again = reconciler.run_once().await.unwrap();
    assert_eq!(again.repaired, 0);
    assert_eq!(h.ledger.call_count(), 1);
}

#[tokio::test]
async fn test_reconciler_reports_unreachable_entities() {
    let h = Harness::new();
    h.entities.set_failing(true);
    h.enqueue(file_request(1, file(1))).await;
    h.run_next(JobKind::FileStore).await;
    let mut sub = h.subscribe();

    let reconciler = Reconciler::new(h.records.clone(), h.entities.clone(), h.bus.clone());
    let report = reconciler.run_once().await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(matches!(
        drain(&mut sub).as_slice(),
        [AnchorEvent::ReconciliationRequired { .. }]
    ));
}

#[tokio::test]
async fn test_reconciler_ignores_failed_records() {
    let h = Harness::new();
    h.ledger.always_fail(LedgerError::new(LedgerErrorCode::InvalidSignature, "bad key"));
    h.enqueue(file_request(1, file(1))).await;
    h.run_next(JobKind::FileStore).await;

    let reconciler = Reconciler::new(h.records.clone(), h.entities.clone(), h.bus.clone());
    let report = reconciler.run_once().await.unwrap();

    assert_eq!(report.checked, 0);
    assert_eq!(h.entities.write_count(), 0);
}
