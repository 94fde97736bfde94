//! # Anchor Telemetry
//!
//! Logging, tracing and Prometheus metrics for the ledger anchoring runtime.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with env filter, pretty or JSON output
//! - **Traces**: optional OTLP export via OpenTelemetry
//! - **Metrics**: Prometheus counters fed from bus events, sampled gauges
//!
//! ## Usage
//!
//! ```rust,ignore
//! use anchor_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset | OTLP collector; export is off when unset |
//! | `OTEL_SERVICE_NAME` | `ledger-anchor` | Service name in traces |
//! | `AX_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `AX_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `AX_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `AX_ENVIRONMENT` | `development` | Deployment environment tag |

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, observe_event, record_queue_depth, record_store_sizes, register_metrics,
    MetricsHandle, CACHE_ENTRIES, CRITICAL_ERRORS, JOBS_COMPLETED, JOBS_DEAD_LETTERED,
    JOBS_ENQUEUED, JOB_RETRIES, LEDGER_SPEND, QUEUE_JOBS, RECONCILIATION_EVENTS, REGISTRY,
    TRANSACTION_RECORDS,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize OpenTelemetry tracer: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize metrics and the global subscriber.
///
/// Hold the returned guard for the lifetime of the process; dropping it
/// flushes pending spans.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    let tracing_guard = tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
