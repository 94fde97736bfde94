//! # RocksDB Storage Adapter
//!
//! Durable `KeyValueStore` shared by the job queue and the transaction
//! ledger. Each subsystem owns a key prefix (`q:` for jobs, `tx:` for
//! records), so a single default column family is enough.
//!
//! ## Configuration
//!
//! - Snappy compression
//! - Bloom filters (10 bits per key) for point lookups by job id
//! - fsync on write by default: an acknowledged enqueue must survive a crash

use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use shared_types::{BatchOperation, KVStoreError, KeyValueStore};
use std::path::Path;

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/rocksdb".to_string(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store
pub struct RocksDbStore {
    db: DB,
    config: RocksDbConfig,
}

fn io_error(op: &str, e: rocksdb::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: format!("RocksDB {} failed: {}", op, e),
    }
}

impl RocksDbStore {
    /// Open or create a RocksDB database
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| KVStoreError::IOError {
            message: format!("Failed to open RocksDB at {}: {}", config.path, e),
        })?;

        Ok(Self { db, config })
    }

    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        Self::open(RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db.get(key).map_err(|e| io_error("get", e))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.db
            .put_opt(key, value, &self.write_opts())
            .map_err(|e| io_error("put", e))
    }

    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.db
            .delete_opt(key, &self.write_opts())
            .map_err(|e| io_error("delete", e))
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        self.db
            .write_opt(batch, &self.write_opts())
            .map_err(|e| io_error("batch write", e))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.db
            .get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| io_error("exists check", e))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let mut results = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| io_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}
