//! Prometheus metrics for the anchoring runtime.
//!
//! All metrics follow the naming convention: `ax_<area>_<metric>_<unit>`
//!
//! Job lifecycle counters are driven from bus events via `observe_event`;
//! gauges are sampled by the runtime.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use shared_bus::AnchorEvent;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // JOB LIFECYCLE
    // =========================================================================

    /// Jobs accepted by the queue
    pub static ref JOBS_ENQUEUED: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_jobs_enqueued_total", "Jobs accepted by the queue"),
        &["kind"]
    ).expect("metric creation failed");

    /// Jobs completed, by source of the ledger reference
    pub static ref JOBS_COMPLETED: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_jobs_completed_total", "Jobs completed"),
        &["kind", "source"]  // source: ledger/cache
    ).expect("metric creation failed");

    /// Transient failures that were rescheduled
    pub static ref JOB_RETRIES: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_job_retries_total", "Failed attempts rescheduled with backoff"),
        &["kind", "code"]
    ).expect("metric creation failed");

    /// Jobs moved to the dead-letter set
    pub static ref JOBS_DEAD_LETTERED: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_jobs_dead_lettered_total", "Jobs moved to the dead-letter set"),
        &["kind", "code"]
    ).expect("metric creation failed");

    /// Ledger spend in tinybars
    pub static ref LEDGER_SPEND: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_ledger_spend_tinybars_total", "Ledger fees paid"),
        &["kind"]
    ).expect("metric creation failed");

    // =========================================================================
    // RECONCILIATION AND ERRORS
    // =========================================================================

    /// Reconciliation signals
    pub static ref RECONCILIATION_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_reconciliation_events_total", "Entity reconciliation signals"),
        &["outcome"]  // outcome: required/reconciled
    ).expect("metric creation failed");

    /// Critical errors by subsystem
    pub static ref CRITICAL_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("ax_critical_errors_total", "Critical errors requiring an operator"),
        &["subsystem"]
    ).expect("metric creation failed");

    // =========================================================================
    // SAMPLED STATE
    // =========================================================================

    /// Queue depth by kind and state
    pub static ref QUEUE_JOBS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ax_queue_jobs", "Jobs in the queue"),
        &["kind", "state"]  // state: ready/delayed/in_flight/dead
    ).expect("metric creation failed");

    /// Result cache entries
    pub static ref CACHE_ENTRIES: IntGauge = IntGauge::new(
        "ax_cache_entries",
        "Entries in the result cache"
    ).expect("metric creation failed");

    /// Transaction records written
    pub static ref TRANSACTION_RECORDS: IntGauge = IntGauge::new(
        "ax_transaction_records",
        "Records in the transaction ledger"
    ).expect("metric creation failed");
}

/// Handle proving the metrics were registered.
pub struct MetricsHandle {
    _registry: Registry,
}

/// Register all metrics with the global registry. Safe to call twice.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(JOBS_COMPLETED.clone()),
        Box::new(JOB_RETRIES.clone()),
        Box::new(JOBS_DEAD_LETTERED.clone()),
        Box::new(LEDGER_SPEND.clone()),
        Box::new(RECONCILIATION_EVENTS.clone()),
        Box::new(CRITICAL_ERRORS.clone()),
        Box::new(QUEUE_JOBS.clone()),
        Box::new(CACHE_ENTRIES.clone()),
        Box::new(TRANSACTION_RECORDS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: REGISTRY.clone(),
    })
}

/// Update lifecycle counters from one bus event.
pub fn observe_event(event: &AnchorEvent) {
    match event {
        AnchorEvent::JobEnqueued { kind, .. } => {
            JOBS_ENQUEUED.with_label_values(&[kind.as_str()]).inc();
        }
        AnchorEvent::JobCompleted {
            kind,
            cost,
            cache_hit,
            ..
        } => {
            let source = if *cache_hit { "cache" } else { "ledger" };
            JOBS_COMPLETED
                .with_label_values(&[kind.as_str(), source])
                .inc();
            LEDGER_SPEND.with_label_values(&[kind.as_str()]).inc_by(*cost);
        }
        AnchorEvent::JobRetryScheduled {
            kind, error_code, ..
        } => {
            JOB_RETRIES
                .with_label_values(&[kind.as_str(), error_code])
                .inc();
        }
        AnchorEvent::JobDeadLettered {
            kind, error_code, ..
        } => {
            JOBS_DEAD_LETTERED
                .with_label_values(&[kind.as_str(), error_code])
                .inc();
        }
        AnchorEvent::ReconciliationRequired { .. } => {
            RECONCILIATION_EVENTS.with_label_values(&["required"]).inc();
        }
        AnchorEvent::EntityReconciled { .. } => {
            RECONCILIATION_EVENTS
                .with_label_values(&["reconciled"])
                .inc();
        }
        AnchorEvent::CriticalError { subsystem_id, .. } => {
            CRITICAL_ERRORS
                .with_label_values(&[&subsystem_id.to_string()])
                .inc();
        }
    }
}

/// Per-kind queue depth sample.
pub fn record_queue_depth(kind: &str, ready: usize, delayed: usize, in_flight: usize, dead: usize) {
    for (state, value) in [
        ("ready", ready),
        ("delayed", delayed),
        ("in_flight", in_flight),
        ("dead", dead),
    ] {
        QUEUE_JOBS
            .with_label_values(&[kind, state])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

pub fn record_store_sizes(cache_entries: usize, transaction_records: usize) {
    CACHE_ENTRIES.set(i64::try_from(cache_entries).unwrap_or(i64::MAX));
    TRANSACTION_RECORDS.set(i64::try_from(transaction_records).unwrap_or(i64::MAX));
}

/// Encode all metrics as Prometheus text format, including collectors the
/// subsystem crates registered on the default registry.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut metric_families = REGISTRY.gather();
    metric_families.extend(prometheus::gather());
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
