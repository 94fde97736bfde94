//! Worker configuration and per-job outcomes.

use shared_types::JobKind;
use std::collections::HashMap;
use std::time::Duration;

/// Worker pool configuration.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Worker tasks per job kind. Each processes one claim at a time.
    pub workers: HashMap<JobKind, usize>,
    /// Upper bound on a single ledger call. Expiry counts as `TIMEOUT`.
    pub call_timeout: Duration,
    /// Idle wait between claims when nothing is ready.
    pub poll_interval: Duration,
    /// How long shutdown waits for in-flight jobs before releasing them.
    pub drain_timeout: Duration,
    /// Period of the expired-lease sweep.
    pub reap_interval: Duration,
    /// Tries for an audit record write before it is reported as lost.
    pub record_write_attempts: u32,
    /// Dead letters older than this are purged by the reaper. `None` keeps
    /// them forever.
    pub dead_letter_retention: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let mut workers = HashMap::new();
        workers.insert(JobKind::ConsensusSubmit, 5);
        workers.insert(JobKind::FileStore, 3);
        Self {
            workers,
            call_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(5),
            record_write_attempts: 3,
            dead_letter_retention: Some(Duration::from_secs(7 * 24 * 3600)),
        }
    }
}

impl WorkerConfig {
    pub fn workers_for(&self, kind: JobKind) -> usize {
        self.workers.get(&kind).copied().unwrap_or(0)
    }

    pub fn with_workers(mut self, kind: JobKind, count: usize) -> Self {
        self.workers.insert(kind, count);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_dead_letter_retention(mut self, retention: Option<Duration>) -> Self {
        self.dead_letter_retention = retention;
        self
    }
}

/// What happened to one claimed job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Acked. `cache_hit` is true when the ledger was not called.
    Completed { ledger_id: String, cache_hit: bool },
    /// Transient failure, back in the queue.
    Rescheduled { attempt: u32, delay: Duration },
    /// Fatal or exhausted; a FAILED record was written.
    DeadLettered { attempts: u32 },
    /// The lease expired before the outcome could be reported.
    LeaseLost,
}

/// Result of one reconciliation sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Owners with at least one SUCCESS record.
    pub checked: usize,
    /// Owners whose ledger reference was written back.
    pub repaired: usize,
    /// Owners that could not be repaired this sweep.
    pub failed: usize,
}

/// Result of a pool shutdown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker finished its job inside the drain timeout.
    pub drained: bool,
    /// Claims handed back to the queue unfinished.
    pub released: usize,
}
