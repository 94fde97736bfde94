//! # Event Monitor
//!
//! Subscribes to every bus event, feeds the telemetry counters and logs the
//! events an operator acts on.

use anchor_telemetry::observe_event;
use shared_bus::{AnchorEvent, Subscription};
use tracing::{debug, error, info, warn};

pub struct EventMonitor {
    subscription: Subscription,
}

impl EventMonitor {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// Run until the bus is dropped.
    pub async fn run(mut self) {
        info!("[runtime] Event monitor started");
        while let Some(event) = self.subscription.recv().await {
            observe_event(&event);
            log_event(&event);
        }
        debug!("[runtime] Event bus closed, monitor exiting");
    }
}

fn log_event(event: &AnchorEvent) {
    match event {
        AnchorEvent::JobEnqueued { job_id, kind, owner } => {
            debug!(%job_id, %kind, %owner, "[runtime] Job enqueued");
        }
        AnchorEvent::JobCompleted {
            job_id,
            owner,
            ledger_id,
            cache_hit,
            ..
        } => {
            debug!(%job_id, %owner, %ledger_id, cache_hit, "[runtime] Job completed");
        }
        AnchorEvent::JobRetryScheduled {
            job_id,
            attempt,
            delay_ms,
            error_code,
            ..
        } => {
            debug!(%job_id, attempt, delay_ms, %error_code, "[runtime] Retry scheduled");
        }
        AnchorEvent::JobDeadLettered {
            job_id,
            kind,
            owner,
            attempts,
            error_code,
            error,
        } => {
            warn!(
                %job_id, %kind, %owner, attempts, %error_code, %error,
                "[runtime] Job dead-lettered"
            );
        }
        AnchorEvent::ReconciliationRequired {
            job_id,
            owner,
            ledger_id,
            reason,
        } => {
            warn!(%job_id, %owner, %ledger_id, %reason, "[runtime] Reconciliation required");
        }
        AnchorEvent::EntityReconciled { owner, ledger_id } => {
            info!(%owner, %ledger_id, "[runtime] Entity reconciled");
        }
        AnchorEvent::CriticalError {
            subsystem_id,
            error,
        } => {
            error!(subsystem_id, %error, "[runtime] Critical error");
        }
    }
}
