//! # Queue Entries
//!
//! Per-job bookkeeping and the values handed across the queue boundary.
//!
//! ## Job States
//!
//! ```text
//!            enqueue
//!               │
//!     ┌─────────▼─────────┐   delay elapsed   ┌─────────┐
//!     │      Delayed      │ ────────────────→ │  Ready  │ ←──────────┐
//!     └───────────────────┘                   └────┬────┘            │
//!               ↑                                  │ claim           │ release /
//!               │ nack (retryable)                 ▼                 │ lease expiry
//!               └──────────────────────────── ┌─────────┐ ───────────┘
//!                                             │ Claimed │
//!                          ack ┌───────────── └────┬────┘
//!                              ▼                   │ nack (fatal or exhausted)
//!                          (removed)               ▼
//!                                             ┌─────────┐
//!                                             │  Dead   │ ── requeue ──→ Ready
//!                                             └─────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{AnchorJob, JobId, JobKind, LedgerError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Producer-side options for an enqueue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Lower values are claimed first. FIFO within a priority.
    pub priority: u32,
    /// Hold the job back for this long before it becomes claimable.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn with_priority(priority: u32) -> Self {
        Self {
            priority,
            delay: None,
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            priority: 0,
            delay: Some(delay),
        }
    }
}

/// Proof of claim ownership. Required to ack, nack or release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeaseToken {
    pub job_id: JobId,
    token: Uuid,
}

impl LeaseToken {
    pub(crate) fn issue(job_id: JobId) -> Self {
        Self {
            job_id,
            token: Uuid::new_v4(),
        }
    }
}

/// A job handed to a worker.
#[derive(Clone, Debug)]
pub struct ClaimedJob {
    pub job: AnchorJob,
    pub lease: LeaseToken,
    /// Lease deadline. After this the job may be reclaimed.
    pub expires_at: Instant,
}

impl ClaimedJob {
    pub fn job_id(&self) -> JobId {
        self.job.job_id()
    }

    pub fn attempt(&self) -> u32 {
        self.job.attempt_count()
    }
}

/// Result of a claim attempt.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(ClaimedJob),
    /// Nothing ready. `next_ready_in` is set when a delayed job is pending.
    Empty { next_ready_in: Option<Duration> },
    /// In-flight cap for the kind is reached.
    Saturated,
    /// Rolling window exhausted; retry after the given wait.
    Throttled { retry_after: Duration },
    /// The kind is paused by an operator.
    Paused,
}

impl ClaimOutcome {
    pub fn into_claimed(self) -> Option<ClaimedJob> {
        match self {
            Self::Claimed(claimed) => Some(claimed),
            _ => None,
        }
    }
}

/// Result of a failed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NackOutcome {
    /// The job will be retried after `delay`.
    Rescheduled { attempt: u32, delay: Duration },
    /// The job moved to the dead-letter set.
    DeadLettered { attempts: u32 },
}

/// A claim that ended without ack or nack.
#[derive(Clone, Debug)]
pub enum ReclaimOutcome {
    /// Back in the ready set.
    Requeued { job_id: JobId, attempts: u32 },
    /// Attempts were exhausted; now dead-lettered.
    DeadLettered(DeadLetter),
}

/// A job that exhausted its retry budget or failed fatally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: AnchorJob,
    pub error: LedgerError,
    pub dead_at: DateTime<Utc>,
}

/// Externally visible job state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Ready { attempts: u32 },
    Delayed { attempts: u32, ready_in: Duration },
    InFlight { attempt: u32 },
    DeadLettered { attempts: u32, error: LedgerError },
}

/// Per-kind queue counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub dead: usize,
    pub paused: bool,
}

impl QueueStats {
    /// Jobs still owed a terminal outcome.
    pub fn pending(&self) -> usize {
        self.ready + self.delayed + self.in_flight
    }
}

/// In-memory state of a job.
#[derive(Clone, Debug)]
pub(crate) enum EntryState {
    Ready,
    Delayed { until: Instant },
    Claimed { lease: LeaseToken, expires_at: Instant },
    Dead(DeadLetter),
}

/// Queue bookkeeping for one job.
#[derive(Clone, Debug)]
pub(crate) struct JobEntry {
    pub job: AnchorJob,
    pub priority: u32,
    pub seq: u64,
    pub state: EntryState,
}

impl JobEntry {
    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    pub fn status(&self, now: Instant) -> JobStatus {
        let attempts = self.job.attempt_count();
        match &self.state {
            EntryState::Ready => JobStatus::Ready { attempts },
            EntryState::Delayed { until } => JobStatus::Delayed {
                attempts,
                ready_in: until.saturating_duration_since(now),
            },
            EntryState::Claimed { .. } => JobStatus::InFlight { attempt: attempts },
            EntryState::Dead(dead) => JobStatus::DeadLettered {
                attempts,
                error: dead.error.clone(),
            },
        }
    }

    /// Durable form. Delays and leases are process-local and are not kept:
    /// a recovered job is ready at once.
    pub fn to_persisted(&self) -> PersistedJob {
        PersistedJob {
            job: self.job.clone(),
            priority: self.priority,
            seq: self.seq,
            dead: match &self.state {
                EntryState::Dead(dead) => Some(dead.clone()),
                _ => None,
            },
        }
    }
}

/// Stored representation of a queued job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PersistedJob {
    pub job: AnchorJob,
    pub priority: u32,
    pub seq: u64,
    #[serde(default)]
    pub dead: Option<DeadLetter>,
}
