//! # Anchor Container
//!
//! Builds every subsystem from one `AnchorConfig` and holds them for the
//! lifetime of the process.
//!
//! ## Initialization Order
//!
//! 1. Key-value store (in-memory, or RocksDB with the `rocksdb` feature)
//! 2. Job queue: reloads persisted jobs, in-flight claims become ready
//! 3. Transaction ledger: resumes its sequence after the last record
//! 4. Result cache and event bus
//! 5. Worker processor, producer client and reconciler

pub mod config;

pub use config::{AnchorConfig, ConfigError};

use ax_01_job_queue::{JobQueue, QueueError};
use ax_02_result_cache::ResultCache;
use ax_03_transaction_ledger::{KvTransactionLedger, LedgerStoreError};
use ax_04_anchor_workers::{
    AnchorDependencies, DomainEntityStore, DryRunLedgerClient, InMemoryEntityStore, JobProcessor,
    LedgerClient, QueueClient, Reconciler,
};
use shared_bus::InMemoryEventBus;
use shared_types::{KVStoreError, KeyValueStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("storage: {0}")]
    Storage(#[from] KVStoreError),

    #[error("job queue: {0}")]
    Queue(#[from] QueueError),

    #[error("transaction ledger: {0}")]
    Records(#[from] LedgerStoreError),

    #[error("only {available}% free on the data volume, {required}% required")]
    DiskSpace { available: u8, required: u8 },
}

/// All runtime services.
pub struct AnchorContainer {
    pub config: AnchorConfig,
    pub queue: Arc<JobQueue>,
    pub cache: Arc<ResultCache>,
    pub records: Arc<KvTransactionLedger>,
    pub bus: Arc<InMemoryEventBus>,
    pub entities: Arc<dyn DomainEntityStore>,
    pub processor: Arc<JobProcessor>,
    pub client: Arc<QueueClient>,
    pub reconciler: Arc<Reconciler>,
}

impl AnchorContainer {
    /// Open the configured store and wire the dry-run ledger client.
    pub fn new(config: AnchorConfig) -> Result<Self, ContainerError> {
        let store = open_store(&config)?;
        let ledger = Arc::new(DryRunLedgerClient::new(config.dry_run_cost));
        Self::with_parts(config, store, ledger, Arc::new(InMemoryEntityStore::new()))
    }

    /// Wire the subsystems around caller-supplied adapters.
    pub fn with_parts(
        config: AnchorConfig,
        store: Arc<dyn KeyValueStore>,
        ledger: Arc<dyn LedgerClient>,
        entities: Arc<dyn DomainEntityStore>,
    ) -> Result<Self, ContainerError> {
        let queue = Arc::new(JobQueue::open(store.clone(), config.queue_config())?);
        let records = Arc::new(KvTransactionLedger::open(store)?);
        let cache = Arc::new(ResultCache::new(config.cache_config()));
        let bus = Arc::new(InMemoryEventBus::new());

        let deps = AnchorDependencies {
            queue: queue.clone(),
            ledger,
            entities: entities.clone(),
            cache: cache.clone(),
            records: records.clone(),
            events: bus.clone(),
        };
        let processor = Arc::new(JobProcessor::new(deps, config.worker_config()));
        let client = Arc::new(QueueClient::new(queue.clone(), bus.clone(), config.topic()));
        let reconciler = Arc::new(Reconciler::new(records.clone(), entities.clone(), bus.clone()));

        info!(topic = %config.topic_id, "[runtime] Subsystems wired");

        Ok(Self {
            config,
            queue,
            cache,
            records,
            bus,
            entities,
            processor,
            client,
            reconciler,
        })
    }
}

#[cfg(feature = "rocksdb")]
fn open_store(config: &AnchorConfig) -> Result<Arc<dyn KeyValueStore>, ContainerError> {
    use crate::adapters::storage::{available_disk_space_percent, RocksDbConfig, RocksDbStore};

    std::fs::create_dir_all(&config.data_dir).map_err(|e| KVStoreError::IOError {
        message: format!("Failed to create {}: {}", config.data_dir.display(), e),
    })?;
    let available =
        available_disk_space_percent(&config.data_dir).map_err(|e| KVStoreError::IOError {
            message: e.to_string(),
        })?;
    if available < config.min_disk_space_percent {
        return Err(ContainerError::DiskSpace {
            available,
            required: config.min_disk_space_percent,
        });
    }

    let path = config.data_dir.join("rocksdb");
    info!(path = %path.display(), "[runtime] Opening RocksDB store");
    let store = RocksDbStore::open(RocksDbConfig {
        path: path.to_string_lossy().to_string(),
        ..RocksDbConfig::default()
    })?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(_config: &AnchorConfig) -> Result<Arc<dyn KeyValueStore>, ContainerError> {
    tracing::warn!("[runtime] Using in-memory store; queued jobs are lost on exit");
    Ok(Arc::new(shared_types::InMemoryKVStore::new()))
}
