//! Queue persistence over the shared `KeyValueStore`.
//!
//! Layout: `q:job:<job_id>` → JSON `PersistedJob`.

use crate::domain::entry::PersistedJob;
use crate::error::{QueueError, QueueResult};
use shared_types::{BatchOperation, JobId, KeyValueStore};
use std::sync::Arc;

pub const JOB_PREFIX: &[u8] = b"q:job:";

fn job_key(job_id: JobId) -> Vec<u8> {
    let mut key = JOB_PREFIX.to_vec();
    key.extend_from_slice(job_id.to_string().as_bytes());
    key
}

/// Write-through store for queue entries.
#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KeyValueStore>,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn encode(job: &PersistedJob) -> QueueResult<Vec<u8>> {
        serde_json::to_vec(job).map_err(|e| QueueError::Unavailable {
            reason: format!("encode {}: {e}", job.job.job_id()),
        })
    }

    pub(crate) fn put(&self, job: &PersistedJob) -> QueueResult<()> {
        let value = Self::encode(job)?;
        self.kv.put(&job_key(job.job.job_id()), &value)?;
        Ok(())
    }

    /// Write several entries atomically.
    pub(crate) fn put_all(&self, jobs: &[PersistedJob]) -> QueueResult<()> {
        let mut ops = Vec::with_capacity(jobs.len());
        for job in jobs {
            ops.push(BatchOperation::put(job_key(job.job.job_id()), Self::encode(job)?));
        }
        self.kv.atomic_batch_write(ops)?;
        Ok(())
    }

    pub(crate) fn delete(&self, job_id: JobId) -> QueueResult<()> {
        self.kv.delete(&job_key(job_id))?;
        Ok(())
    }

    pub(crate) fn delete_all(&self, job_ids: &[JobId]) -> QueueResult<()> {
        let ops = job_ids
            .iter()
            .map(|id| BatchOperation::delete(job_key(*id)))
            .collect();
        self.kv.atomic_batch_write(ops)?;
        Ok(())
    }

    /// Every persisted entry, in key order.
    pub(crate) fn load_all(&self) -> QueueResult<Vec<PersistedJob>> {
        let mut jobs = Vec::new();
        for (key, value) in self.kv.prefix_scan(JOB_PREFIX)? {
            let job = serde_json::from_slice(&value).map_err(|e| QueueError::Corrupted {
                key: String::from_utf8_lossy(&key).into_owned(),
                message: e.to_string(),
            })?;
            jobs.push(job);
        }
        Ok(jobs)
    }
}
