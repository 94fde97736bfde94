//! # Transaction Ledger Service
//!
//! Append-only audit log over the shared `KeyValueStore`.
//!
//! Sequence numbers come from an atomic counter seeded from the highest
//! stored key at open, so concurrent appenders never write the same key
//! and no record key is ever written twice.

use crate::domain::keys::{self, RECORD_PREFIX};
use crate::domain::CostSummary;
use crate::error::{LedgerStoreError, LedgerStoreResult};
use crate::ports::inbound::TransactionLedgerApi;
use shared_types::{
    BatchOperation, ContentHash, EntityRef, InMemoryKVStore, KeyValueStore, RecordStatus,
    TransactionRecord, UserId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Transaction ledger backed by a key-value store.
pub struct KvTransactionLedger {
    kv: Arc<dyn KeyValueStore>,
    next_seq: AtomicU64,
}

impl KvTransactionLedger {
    /// Open the ledger, resuming the sequence after the last stored record.
    pub fn open(kv: Arc<dyn KeyValueStore>) -> LedgerStoreResult<Self> {
        let existing = kv.prefix_scan(RECORD_PREFIX.as_bytes())?;
        let next_seq = existing
            .last()
            .and_then(|(key, _)| keys::parse_record_seq(key))
            .map_or(0, |seq| seq + 1);
        if next_seq > 0 {
            info!(records = existing.len(), "[ax-03] Transaction ledger opened");
        }
        Ok(Self {
            kv,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            kv: Arc::new(InMemoryKVStore::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    fn decode(key: &[u8], bytes: &[u8]) -> LedgerStoreResult<TransactionRecord> {
        serde_json::from_slice(bytes).map_err(|e| LedgerStoreError::Corrupted {
            key: String::from_utf8_lossy(key).into_owned(),
            message: e.to_string(),
        })
    }

    /// Resolve an index prefix to records, in append order.
    fn query_index(&self, prefix: &[u8]) -> LedgerStoreResult<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        for (index_key, record_key) in self.kv.prefix_scan(prefix)? {
            let bytes = self
                .kv
                .get(&record_key)?
                .ok_or_else(|| LedgerStoreError::DanglingIndex {
                    key: String::from_utf8_lossy(&index_key).into_owned(),
                })?;
            records.push(Self::decode(&record_key, &bytes)?);
        }
        Ok(records)
    }

    fn scan_all(&self) -> LedgerStoreResult<Vec<TransactionRecord>> {
        self.kv
            .prefix_scan(RECORD_PREFIX.as_bytes())?
            .iter()
            .map(|(key, value)| Self::decode(key, value))
            .collect()
    }
}

impl TransactionLedgerApi for KvTransactionLedger {
    fn append(&self, record: TransactionRecord) -> LedgerStoreResult<()> {
        let value = serde_json::to_vec(&record).map_err(|e| LedgerStoreError::Unavailable {
            reason: format!("encode record {}: {e}", record.record_id),
        })?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record_key = keys::record_key(seq);
        let ops = vec![
            BatchOperation::put(record_key.clone(), value),
            BatchOperation::put(
                keys::index_key(&keys::owner_prefix(&record.owner), seq),
                record_key.clone(),
            ),
            BatchOperation::put(
                keys::index_key(&keys::requester_prefix(record.requester_id), seq),
                record_key.clone(),
            ),
            BatchOperation::put(
                keys::index_key(&keys::hash_prefix(&record.content_hash), seq),
                record_key,
            ),
        ];
        self.kv.atomic_batch_write(ops)?;

        debug!(
            seq,
            tx_id = %record.tx_id,
            job_id = %record.job_id,
            owner = %record.owner,
            status = ?record.status,
            cost = record.cost,
            "[ax-03] Transaction record appended"
        );
        Ok(())
    }

    fn query_by_owner(&self, owner: &EntityRef) -> LedgerStoreResult<Vec<TransactionRecord>> {
        self.query_index(&keys::owner_prefix(owner))
    }

    fn query_by_requester(&self, requester: UserId) -> LedgerStoreResult<Vec<TransactionRecord>> {
        self.query_index(&keys::requester_prefix(requester))
    }

    fn query_by_content_hash(
        &self,
        hash: &ContentHash,
    ) -> LedgerStoreResult<Vec<TransactionRecord>> {
        self.query_index(&keys::hash_prefix(hash))
    }

    fn query_by_status(&self, status: RecordStatus) -> LedgerStoreResult<Vec<TransactionRecord>> {
        Ok(self
            .scan_all()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    fn cost_summary(&self) -> LedgerStoreResult<CostSummary> {
        Ok(self.scan_all()?.iter().collect())
    }

    fn record_count(&self) -> LedgerStoreResult<usize> {
        Ok(self.kv.prefix_scan(RECORD_PREFIX.as_bytes())?.len())
    }
}
