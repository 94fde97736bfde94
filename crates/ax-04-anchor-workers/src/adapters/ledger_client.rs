//! Ledger Client Adapters
//!
//! `DryRunLedgerClient` stands in for the network client when no ledger
//! account is configured. `MockLedgerClient` is scripted and instrumented
//! for tests.

use crate::ports::outbound::LedgerClient;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use shared_types::{
    ContentHash, FilePayload, JobKind, LedgerError, LedgerReceipt, TopicRef, TxId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

const OPERATOR_ACCOUNT: &str = "0.0.2";
const FIRST_FILE_NUM: u64 = 1000;

fn synthetic_tx_id(seq: u64) -> TxId {
    TxId::new(format!(
        "{}@{}.{:09}",
        OPERATOR_ACCOUNT,
        Utc::now().timestamp(),
        seq
    ))
}

fn synthetic_receipt(kind: JobKind, seq: u64, cost: u64) -> LedgerReceipt {
    let tx_id = synthetic_tx_id(seq);
    let ledger_id = match kind {
        JobKind::FileStore => format!("0.0.{}", FIRST_FILE_NUM + seq),
        JobKind::ConsensusSubmit => tx_id.as_str().to_string(),
    };
    LedgerReceipt {
        ledger_id,
        tx_id,
        cost,
        consensus_timestamp: Some(Utc::now().to_rfc3339()),
    }
}

/// Accepts every call and fabricates receipts locally. Spends nothing.
pub struct DryRunLedgerClient {
    cost: u64,
    seq: AtomicU64,
}

impl DryRunLedgerClient {
    pub fn new(cost: u64) -> Self {
        Self {
            cost,
            seq: AtomicU64::new(0),
        }
    }
}

impl Default for DryRunLedgerClient {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl LedgerClient for DryRunLedgerClient {
    async fn submit_message(
        &self,
        topic: &TopicRef,
        message: &[u8],
    ) -> Result<LedgerReceipt, LedgerError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let receipt = synthetic_receipt(JobKind::ConsensusSubmit, seq, self.cost);
        info!(
            topic = %topic,
            bytes = message.len(),
            tx_id = %receipt.tx_id,
            "[ax-04] Dry-run consensus submit"
        );
        Ok(receipt)
    }

    async fn upload_file(&self, file: &FilePayload) -> Result<LedgerReceipt, LedgerError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let receipt = synthetic_receipt(JobKind::FileStore, seq, self.cost);
        info!(
            file_name = %file.file_name,
            bytes = file.size(),
            file_id = %receipt.ledger_id,
            "[ax-04] Dry-run file upload"
        );
        Ok(receipt)
    }
}

/// One observed call on the mock.
#[derive(Clone, Debug)]
pub struct LedgerCall {
    pub kind: JobKind,
    pub content_hash: ContentHash,
    pub at: Instant,
}

/// Scripted, instrumented ledger client for tests.
///
/// Scripted responses are consumed in call order; once exhausted every call
/// succeeds, unless `always_fail` is set.
pub struct MockLedgerClient {
    cost: u64,
    latency: Duration,
    script: Mutex<VecDeque<Result<(), LedgerError>>>,
    always_fail: Mutex<Option<LedgerError>>,
    calls: RwLock<Vec<LedgerCall>>,
    in_flight: Mutex<HashMap<ContentHash, usize>>,
    max_concurrent: AtomicUsize,
    seq: AtomicU64,
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self {
            cost: 5,
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            always_fail: Mutex::new(None),
            calls: RwLock::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_concurrent: AtomicUsize::new(0),
            seq: AtomicU64::new(0),
        }
    }

    /// Cost reported on every successful receipt.
    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Time each call spends "on the network".
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `times` calls with `error`.
    pub fn fail_times(&self, times: usize, error: LedgerError) {
        let mut script = self.script.lock();
        for _ in 0..times {
            script.push_back(Err(error.clone()));
        }
    }

    /// Queue one successful call ahead of any later scripted failures.
    pub fn succeed_once(&self) {
        self.script.lock().push_back(Ok(()));
    }

    pub fn always_fail(&self, error: LedgerError) {
        *self.always_fail.lock() = Some(error);
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn calls_for(&self, hash: &ContentHash) -> usize {
        self.calls
            .read()
            .iter()
            .filter(|call| call.content_hash == *hash)
            .count()
    }

    /// Highest number of simultaneous calls seen for any single content.
    pub fn max_concurrent_per_content(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    async fn call(&self, kind: JobKind, hash: ContentHash) -> Result<LedgerReceipt, LedgerError> {
        self.calls.write().push(LedgerCall {
            kind,
            content_hash: hash,
            at: tokio::time::Instant::now().into_std(),
        });
        {
            let mut in_flight = self.in_flight.lock();
            let current = in_flight.entry(hash).or_insert(0);
            *current += 1;
            self.max_concurrent.fetch_max(*current, Ordering::SeqCst);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        {
            let mut in_flight = self.in_flight.lock();
            if let Some(current) = in_flight.get_mut(&hash) {
                *current = current.saturating_sub(1);
            }
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(Err(error)) => return Err(error),
            Some(Ok(())) => {}
            None => {
                if let Some(error) = self.always_fail.lock().clone() {
                    return Err(error);
                }
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(synthetic_receipt(kind, seq, self.cost))
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn submit_message(
        &self,
        topic: &TopicRef,
        message: &[u8],
    ) -> Result<LedgerReceipt, LedgerError> {
        let hash = ContentHash::of_parts(&[topic.0.as_bytes(), message]);
        self.call(JobKind::ConsensusSubmit, hash).await
    }

    async fn upload_file(&self, file: &FilePayload) -> Result<LedgerReceipt, LedgerError> {
        self.call(JobKind::FileStore, file.content_hash).await
    }
}
