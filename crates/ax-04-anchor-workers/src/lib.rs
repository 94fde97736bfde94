//! # ax-04-anchor-workers
//!
//! Drains the job queue, performs the ledger call and makes each outcome
//! durable and visible.
//!
//! ## Architecture
//!
//! ```text
//!  Producers ──→ QueueClient ──enqueue──→ Job Queue (1)
//!                                             │ claim
//!                                             ▼
//!                                   ┌──────────────────┐
//!                                   │   WorkerPool     │
//!                                   │  N per job kind  │
//!                                   └────────┬─────────┘
//!                                            │ JobProcessor
//!          ┌───────────────┬─────────────────┼──────────────────┬──────────────┐
//!          ▼               ▼                 ▼                  ▼              ▼
//!   Result Cache (2)  LedgerClient   Transaction Ledger (3)  Entity Store   Event Bus
//! ```
//!
//! ## Outcome Policy
//!
//! | Outcome | Record | Entity | Cache | Queue |
//! |---------|--------|--------|-------|-------|
//! | Ledger success | SUCCESS, receipt cost | updated | put | ack |
//! | Cache hit | SUCCESS reused, cost 0 | updated | - | ack |
//! | Transient failure | none | - | - | nack, rescheduled |
//! | Fatal or exhausted | FAILED, cost 0 | untouched | - | nack, dead-lettered |
//!
//! A failed entity update after a paid ledger call is never retried against
//! the ledger. It is reported as `ReconciliationRequired` and repaired by
//! the `Reconciler` from the SUCCESS records.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::{DryRunLedgerClient, InMemoryEntityStore, MockLedgerClient};
pub use domain::{ProcessOutcome, ReconcileReport, ShutdownReport, WorkerConfig};
pub use error::{EntityStoreError, WorkerError, WorkerResult};
pub use ports::inbound::{AnchoringApi, JobHandler};
pub use ports::outbound::{DomainEntityStore, LedgerClient};
pub use service::{
    AnchorDependencies, ConsensusSubmitHandler, FileStoreHandler, JobProcessor, QueueClient,
    Reconciler, WorkerPool,
};
