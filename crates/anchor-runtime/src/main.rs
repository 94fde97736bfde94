//! # Ledger Anchor Runtime
//!
//! Runs the asynchronous anchoring pipeline: producers enqueue jobs, worker
//! pools drain them against the ledger, and every outcome lands in the
//! transaction ledger.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logs, optional OTLP traces, metrics)
//! 2. Load and validate `AX_*` configuration
//! 3. Open storage; the queue reloads jobs left by a previous process
//! 4. Start the event monitor, reconciliation and stats tasks
//! 5. Start the worker pools
//!
//! ## Shutdown Sequence
//!
//! On Ctrl-C the pools stop claiming and drain in-flight jobs up to
//! `AX_DRAIN_TIMEOUT_SECS`; unfinished claims are released to the queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use anchor_runtime::container::{AnchorConfig, AnchorContainer};
use anchor_runtime::handlers::{EventMonitor, ReconcileScheduler, StatsSampler};
use anchor_telemetry::{init_telemetry, TelemetryConfig};
use ax_04_anchor_workers::WorkerPool;
use shared_bus::EventFilter;

struct AnchorRuntime {
    container: Arc<AnchorContainer>,
    pool: WorkerPool,
    tasks: Vec<JoinHandle<()>>,
}

impl AnchorRuntime {
    fn new(config: AnchorConfig) -> Result<Self> {
        let container =
            Arc::new(AnchorContainer::new(config).context("Failed to initialize subsystems")?);
        let pool = WorkerPool::new(container.processor.clone());
        Ok(Self {
            container,
            pool,
            tasks: Vec::new(),
        })
    }

    fn start(&mut self) {
        let config = &self.container.config;
        info!("===========================================");
        info!("  Ledger Anchor Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let monitor = EventMonitor::new(self.container.bus.subscribe(EventFilter::all()));
        self.tasks.push(tokio::spawn(monitor.run()));

        let reconcile =
            ReconcileScheduler::new(self.container.reconciler.clone(), config.reconcile_interval);
        self.tasks.push(tokio::spawn(reconcile.run()));

        let stats = StatsSampler::new(
            self.container.queue.clone(),
            self.container.cache.clone(),
            self.container.records.clone(),
            config.stats_interval,
            config.metrics_file.clone(),
        );
        self.tasks.push(tokio::spawn(stats.run()));

        self.pool.start();

        info!(
            topic = %config.topic_id,
            consensus_workers = config.consensus_concurrency,
            file_workers = config.file_concurrency,
            max_attempts = config.max_attempts,
            "[runtime] Anchoring started"
        );
    }

    async fn shutdown(self) {
        info!("[runtime] Initiating graceful shutdown");
        let report = self.pool.shutdown().await;
        if report.drained {
            info!("[runtime] All in-flight jobs finished");
        } else {
            warn!(
                released = report.released,
                "[runtime] Drain timeout hit, unfinished jobs released to the queue"
            );
        }

        for task in self.tasks {
            task.abort();
        }
        info!("[runtime] Shutdown complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let config = AnchorConfig::from_env().context("Invalid configuration")?;
    config.validate().context("Invalid configuration")?;

    let mut runtime = AnchorRuntime::new(config)?;
    runtime.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("[runtime] Shutdown signal received");

    runtime.shutdown().await;
    Ok(())
}
