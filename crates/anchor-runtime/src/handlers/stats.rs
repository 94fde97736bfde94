//! # Stats Sampler
//!
//! Samples queue depth and store sizes into the telemetry gauges and, when
//! configured, rewrites a Prometheus text file for a node exporter to pick
//! up. The file is written to a sibling temp path and renamed into place.

use anchor_telemetry::{encode_metrics, record_queue_depth, record_store_sizes};
use ax_01_job_queue::JobQueueApi;
use ax_02_result_cache::ResultCacheApi;
use ax_03_transaction_ledger::TransactionLedgerApi;
use shared_types::JobKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct StatsSampler {
    queue: Arc<dyn JobQueueApi>,
    cache: Arc<dyn ResultCacheApi>,
    records: Arc<dyn TransactionLedgerApi>,
    interval: Duration,
    metrics_file: Option<PathBuf>,
}

impl StatsSampler {
    pub fn new(
        queue: Arc<dyn JobQueueApi>,
        cache: Arc<dyn ResultCacheApi>,
        records: Arc<dyn TransactionLedgerApi>,
        interval: Duration,
        metrics_file: Option<PathBuf>,
    ) -> Self {
        Self {
            queue,
            cache,
            records,
            interval,
            metrics_file,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.sample().await;
        }
    }

    /// One sample and export.
    pub async fn sample(&self) {
        for kind in JobKind::ALL {
            let stats = self.queue.stats(kind).await;
            record_queue_depth(
                kind.as_str(),
                stats.ready,
                stats.delayed,
                stats.in_flight,
                stats.dead,
            );
            debug!(
                %kind,
                ready = stats.ready,
                delayed = stats.delayed,
                in_flight = stats.in_flight,
                dead = stats.dead,
                paused = stats.paused,
                "[runtime] Queue depth"
            );
        }

        match self.records.record_count() {
            Ok(count) => record_store_sizes(self.cache.stats().entries, count),
            Err(e) => warn!(error = %e, "[runtime] Record count unavailable"),
        }

        if let Some(path) = &self.metrics_file {
            if let Err(e) = write_metrics_file(path).await {
                warn!(path = %path.display(), error = %e, "[runtime] Metrics export failed");
            }
        }
    }
}

async fn write_metrics_file(path: &Path) -> std::io::Result<()> {
    let text = encode_metrics()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await
}
