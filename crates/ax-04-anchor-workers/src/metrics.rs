//! # Worker Metrics
//!
//! Prometheus metrics for ledger calls made by the worker pool.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! ax-04-anchor-workers = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `anchor_ledger_call_duration_seconds` - Histogram of ledger call latency (by kind)
//! - `anchor_ledger_failures_total` - Counter of failed ledger calls (by kind, class)
//! - `anchor_cache_lookups_total` - Counter of result cache lookups (by kind, result)
//! - `anchor_unrecorded_outcomes_total` - Counter of audit records that could not be written
//! - `anchor_reconciliations_total` - Counter of entity reconciliation outcomes (by result)
//!
//! Job lifecycle counts (enqueued, completed, dead-lettered, spend) are
//! derived from bus events by `anchor-telemetry`.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

use shared_types::{ErrorClass, JobKind};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Ledger call latency, labeled by job kind
    pub static ref LEDGER_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "anchor_ledger_call_duration_seconds",
        "Latency of ledger client calls",
        &["kind"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create LEDGER_CALL_DURATION metric");

    /// Failed ledger calls, labeled by kind and error class
    pub static ref LEDGER_FAILURES: IntCounterVec = register_int_counter_vec!(
        "anchor_ledger_failures_total",
        "Total number of failed ledger calls",
        &["kind", "class"]
    )
    .expect("Failed to create LEDGER_FAILURES metric");

    /// Result cache lookups, labeled by kind and hit/miss
    pub static ref CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "anchor_cache_lookups_total",
        "Total number of result cache lookups",
        &["kind", "result"]
    )
    .expect("Failed to create CACHE_LOOKUPS metric");

    /// Outcomes whose audit record could not be written
    pub static ref UNRECORDED_OUTCOMES: IntCounter = register_int_counter!(
        "anchor_unrecorded_outcomes_total",
        "Total number of job outcomes missing from the transaction ledger"
    )
    .expect("Failed to create UNRECORDED_OUTCOMES metric");

    /// Reconciliation outcomes (required, repaired, failed)
    pub static ref RECONCILIATIONS: IntCounterVec = register_int_counter_vec!(
        "anchor_reconciliations_total",
        "Total number of entity reconciliation outcomes",
        &["result"]
    )
    .expect("Failed to create RECONCILIATIONS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a ledger call's latency
#[cfg(feature = "metrics")]
pub fn record_ledger_call(kind: JobKind, seconds: f64) {
    LEDGER_CALL_DURATION
        .with_label_values(&[kind.as_str()])
        .observe(seconds);
}

/// Record a failed ledger call
#[cfg(feature = "metrics")]
pub fn record_ledger_failure(kind: JobKind, class: ErrorClass) {
    LEDGER_FAILURES
        .with_label_values(&[kind.as_str(), class.as_str()])
        .inc();
}

/// Record a cache lookup
#[cfg(feature = "metrics")]
pub fn record_cache_lookup(kind: JobKind, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS
        .with_label_values(&[kind.as_str(), result])
        .inc();
}

/// Record an outcome that is missing from the audit trail
#[cfg(feature = "metrics")]
pub fn record_unrecorded_outcome() {
    UNRECORDED_OUTCOMES.inc();
}

/// Record a reconciliation outcome
#[cfg(feature = "metrics")]
pub fn record_reconciliation(result: &str) {
    RECONCILIATIONS.with_label_values(&[result]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature is disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_ledger_call(_kind: JobKind, _seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_ledger_failure(_kind: JobKind, _class: ErrorClass) {}

#[cfg(not(feature = "metrics"))]
pub fn record_cache_lookup(_kind: JobKind, _hit: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_unrecorded_outcome() {}

#[cfg(not(feature = "metrics"))]
pub fn record_reconciliation(_result: &str) {}
