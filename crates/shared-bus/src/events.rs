//! # Anchoring Events
//!
//! Defines all event types that flow through the shared bus.
//!
//! Events are notifications only. The queue and the transaction ledger are
//! the sources of truth; a dropped event never loses work.

use serde::{Deserialize, Serialize};
use shared_types::entities::{EntityRef, JobId, JobKind, TxId};

/// Subsystem identifiers used as event sources.
pub mod subsystem {
    pub const RUNTIME: u8 = 0;
    pub const JOB_QUEUE: u8 = 1;
    pub const RESULT_CACHE: u8 = 2;
    pub const TRANSACTION_LEDGER: u8 = 3;
    pub const ANCHOR_WORKERS: u8 = 4;
}

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnchorEvent {
    // =========================================================================
    // SUBSYSTEM 1: JOB QUEUE
    // =========================================================================
    /// A job was accepted by the queue.
    JobEnqueued {
        job_id: JobId,
        kind: JobKind,
        owner: EntityRef,
    },

    // =========================================================================
    // SUBSYSTEM 4: ANCHOR WORKERS
    // =========================================================================
    /// A job finished with a ledger receipt (fresh or reused).
    JobCompleted {
        job_id: JobId,
        kind: JobKind,
        owner: EntityRef,
        tx_id: TxId,
        ledger_id: String,
        /// Cost in tinybars. Zero on a cache hit.
        cost: u64,
        cache_hit: bool,
        attempts: u32,
    },

    /// A transient failure was rescheduled.
    JobRetryScheduled {
        job_id: JobId,
        kind: JobKind,
        attempt: u32,
        delay_ms: u64,
        error_code: String,
    },

    /// A job exhausted its attempts or hit a fatal error.
    JobDeadLettered {
        job_id: JobId,
        kind: JobKind,
        owner: EntityRef,
        attempts: u32,
        error_code: String,
        error: String,
    },

    /// The ledger call succeeded but the owning entity was not updated.
    /// The transaction record exists; only the domain write is missing.
    ReconciliationRequired {
        job_id: JobId,
        owner: EntityRef,
        ledger_id: String,
        reason: String,
    },

    /// A missing ledger reference was written back from the audit trail.
    EntityReconciled { owner: EntityRef, ledger_id: String },

    // =========================================================================
    // CRITICAL EVENTS (DLQ)
    // =========================================================================
    /// Critical error requiring operator attention.
    CriticalError {
        /// The subsystem that encountered the error.
        subsystem_id: u8,
        /// Error description.
        error: String,
    },
}

impl AnchorEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::JobEnqueued { .. } => EventTopic::Queue,
            Self::JobCompleted { .. } | Self::JobRetryScheduled { .. } => EventTopic::Workers,
            Self::JobDeadLettered { .. } | Self::CriticalError { .. } => {
                EventTopic::DeadLetterQueue
            }
            Self::ReconciliationRequired { .. } | Self::EntityReconciled { .. } => {
                EventTopic::Reconciliation
            }
        }
    }

    /// Get the originating subsystem ID.
    #[must_use]
    pub fn source_subsystem(&self) -> u8 {
        match self {
            Self::JobEnqueued { .. } => subsystem::JOB_QUEUE,
            Self::JobCompleted { .. }
            | Self::JobRetryScheduled { .. }
            | Self::JobDeadLettered { .. }
            | Self::ReconciliationRequired { .. }
            | Self::EntityReconciled { .. } => subsystem::ANCHOR_WORKERS,
            Self::CriticalError { subsystem_id, .. } => *subsystem_id,
        }
    }

    /// Job the event refers to, if any.
    #[must_use]
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::JobEnqueued { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobRetryScheduled { job_id, .. }
            | Self::JobDeadLettered { job_id, .. }
            | Self::ReconciliationRequired { job_id, .. } => Some(*job_id),
            Self::EntityReconciled { .. } | Self::CriticalError { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Subsystem 1 events.
    Queue,
    /// Subsystem 4 processing outcomes.
    Workers,
    /// Ledger/domain divergence and its repair.
    Reconciliation,
    /// Dead-lettered jobs and critical errors.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Source subsystems to include. Empty means all sources.
    pub source_subsystems: Vec<u8>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            source_subsystems: Vec::new(),
        }
    }

    /// Create a filter for events from specific subsystems.
    #[must_use]
    pub fn from_subsystems(subsystems: Vec<u8>) -> Self {
        Self {
            topics: Vec::new(),
            source_subsystems: subsystems,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &AnchorEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_subsystems.is_empty()
            || self.source_subsystems.contains(&event.source_subsystem());

        topic_match && source_match
    }
}
