//! # Test Harness
//!
//! A full pipeline wired through `AnchorContainer` around an instrumented
//! ledger client and a key-value store that audits every write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use anchor_runtime::{AnchorConfig, AnchorContainer};
use ax_01_job_queue::{EnqueueOptions, JobQueueApi};
use ax_04_anchor_workers::{
    AnchoringApi, InMemoryEntityStore, MockLedgerClient, ProcessOutcome, ShutdownReport,
    WorkerPool,
};
use shared_bus::{AnchorEvent, EventFilter, Subscription};
use shared_types::{
    AnchorPayload, AnchorRequest, BatchOperation, ConsensusPayload, EntityRef, FilePayload,
    InMemoryKVStore, JobId, JobKind, KVStoreError, KeyValueStore, LedgerError, LedgerErrorCode,
    TopicRef, UserId,
};

/// Keys owned by the transaction ledger. Written once, never changed.
pub const AUDIT_PREFIX: &[u8] = b"tx:";

// =============================================================================
// RECORDING STORE
// =============================================================================

/// In-memory store that flags any overwrite or delete of an audit key.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryKVStore,
    audit_writes: AtomicUsize,
    violations: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// New audit keys written so far.
    pub fn audit_writes(&self) -> usize {
        self.audit_writes.load(Ordering::SeqCst)
    }

    /// Overwrites and deletes of audit keys, as readable descriptions.
    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().clone()
    }

    fn check_put(&self, key: &[u8]) -> Result<(), KVStoreError> {
        if !key.starts_with(AUDIT_PREFIX) {
            return Ok(());
        }
        if self.inner.exists(key)? {
            self.violations
                .lock()
                .push(format!("overwrite {}", String::from_utf8_lossy(key)));
        } else {
            self.audit_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn check_delete(&self, key: &[u8]) {
        if key.starts_with(AUDIT_PREFIX) {
            self.violations
                .lock()
                .push(format!("delete {}", String::from_utf8_lossy(key)));
        }
    }
}

impl KeyValueStore for RecordingStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.check_put(key)?;
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.check_delete(key);
        self.inner.delete(key)
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        for op in &operations {
            match op {
                BatchOperation::Put { key, .. } => self.check_put(key)?,
                BatchOperation::Delete { key } => self.check_delete(key),
            }
        }
        self.inner.atomic_batch_write(operations)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        self.inner.prefix_scan(prefix)
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

pub struct Pipeline {
    pub store: Arc<RecordingStore>,
    pub ledger: Arc<MockLedgerClient>,
    pub entities: Arc<InMemoryEntityStore>,
    pub container: AnchorContainer,
}

impl Pipeline {
    /// Immediate retries, no rate windows, one worker per kind.
    pub fn test_config() -> AnchorConfig {
        AnchorConfig {
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
            backoff_jitter: 0.0,
            consensus_concurrency: 1,
            consensus_rate_max: 0,
            file_concurrency: 1,
            file_rate_max: 0,
            poll_interval: Duration::from_millis(50),
            reap_interval: Duration::from_millis(500),
            ..AnchorConfig::default()
        }
    }

    pub fn new(config: AnchorConfig, ledger: MockLedgerClient) -> Self {
        Self::open(config, Arc::new(ledger), Arc::new(RecordingStore::new()))
    }

    /// Wire a pipeline over an existing store, as a restarted process would.
    pub fn open(
        config: AnchorConfig,
        ledger: Arc<MockLedgerClient>,
        store: Arc<RecordingStore>,
    ) -> Self {
        let entities = Arc::new(InMemoryEntityStore::new());
        let container =
            AnchorContainer::with_parts(config, store.clone(), ledger.clone(), entities.clone())
                .expect("pipeline wiring");
        Self {
            store,
            ledger,
            entities,
            container,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.container.bus.subscribe(EventFilter::all())
    }

    pub async fn submit(&self, request: AnchorRequest) -> JobId {
        self.container
            .client
            .submit(request, EnqueueOptions::default())
            .await
            .expect("enqueue")
    }

    /// Claim and process the next job of `kind` on the calling task.
    pub async fn run_next(&self, kind: JobKind) -> ProcessOutcome {
        let claimed = self
            .container
            .queue
            .claim(kind)
            .await
            .expect("claim")
            .into_claimed()
            .expect("a ready job");
        self.container
            .processor
            .process(claimed)
            .await
            .expect("outcome reported")
    }

    /// No job of any kind is ready, delayed or in flight.
    pub async fn settled(&self) -> bool {
        for kind in JobKind::ALL {
            if self.container.queue.stats(kind).await.pending() > 0 {
                return false;
            }
        }
        true
    }

    /// Run a worker pool until the queue settles, then shut it down.
    pub async fn run_until_settled(&self) -> ShutdownReport {
        let pool = WorkerPool::new(self.container.processor.clone());
        pool.start();
        for _ in 0..10_000 {
            if self.settled().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(self.settled().await, "queue did not settle");
        pool.shutdown().await
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn file(n: u64) -> FilePayload {
    FilePayload::new(
        format!("lab report {n}").into_bytes(),
        format!("report-{n}.pdf"),
        "application/pdf",
    )
}

pub fn file_request(doc: u64, payload: FilePayload) -> AnchorRequest {
    AnchorRequest::new(
        AnchorPayload::FileStore(payload),
        EntityRef::document(doc),
        UserId(11),
    )
}

pub fn consensus_request(n: u64) -> AnchorRequest {
    AnchorRequest::new(
        AnchorPayload::ConsensusSubmit(ConsensusPayload::new(
            TopicRef("0.0.6006".into()),
            format!("{{\"consultation\":{n}}}").into_bytes(),
        )),
        EntityRef::consultation(n),
        UserId(11),
    )
}

pub fn busy() -> LedgerError {
    LedgerError::new(LedgerErrorCode::Busy, "node busy")
}

pub fn fatal() -> LedgerError {
    LedgerError::new(LedgerErrorCode::InvalidSignature, "signature rejected")
}

pub fn drain(sub: &mut Subscription) -> Vec<AnchorEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = sub.try_recv() {
        events.push(event);
    }
    events
}
