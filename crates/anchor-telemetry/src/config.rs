//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging, tracing and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name for traces and logs
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or full directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// OTLP collector endpoint. Trace export is off when unset.
    pub otlp_endpoint: Option<String>,

    /// Deployment environment (development, staging, production)
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ledger-anchor".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            otlp_endpoint: None,
            environment: "development".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: ledger-anchor)
    /// - `AX_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `AX_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `AX_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: unset, no export)
    /// - `AX_ENVIRONMENT`: Deployment environment (default: development)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("AX_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            console_output: lookup("AX_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),

            json_logs: lookup("AX_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),

            environment: lookup("AX_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }
}
