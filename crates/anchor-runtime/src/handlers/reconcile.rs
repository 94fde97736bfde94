//! Periodic reconciliation sweep.

use ax_04_anchor_workers::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub struct ReconcileScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Sweep once at start, then every `interval`. Never returns.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.reconciler.run_once().await {
                Ok(report) if report.repaired > 0 || report.failed > 0 => {
                    info!(
                        checked = report.checked,
                        repaired = report.repaired,
                        failed = report.failed,
                        "[runtime] Reconciliation sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "[runtime] Reconciliation sweep failed"),
            }
        }
    }
}
