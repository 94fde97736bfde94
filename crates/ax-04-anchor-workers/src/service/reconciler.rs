//! Reconciliation of domain entities against the audit trail.
//!
//! A SUCCESS record whose owner does not hold the recorded ledger id means
//! an entity update was lost after the ledger was paid. The sweep writes
//! the reference back. The ledger is never called.

use crate::domain::ReconcileReport;
use crate::error::WorkerResult;
use crate::metrics;
use crate::ports::outbound::DomainEntityStore;
use ax_03_transaction_ledger::TransactionLedgerApi;
use shared_bus::{AnchorEvent, EventPublisher};
use shared_types::{EntityRef, JobId, RecordStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Reconciler {
    records: Arc<dyn TransactionLedgerApi>,
    entities: Arc<dyn DomainEntityStore>,
    events: Arc<dyn EventPublisher>,
}

impl Reconciler {
    pub fn new(
        records: Arc<dyn TransactionLedgerApi>,
        entities: Arc<dyn DomainEntityStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            records,
            entities,
            events,
        }
    }

    /// One full sweep. The latest SUCCESS record per owner wins.
    pub async fn run_once(&self) -> WorkerResult<ReconcileReport> {
        let mut latest: BTreeMap<EntityRef, (JobId, String)> = BTreeMap::new();
        for record in self.records.query_by_status(RecordStatus::Success)? {
            if let Some(ledger_id) = record.ledger_id {
                latest.insert(record.owner, (record.job_id, ledger_id));
            }
        }

        let mut report = ReconcileReport {
            checked: latest.len(),
            ..ReconcileReport::default()
        };

        for (owner, (job_id, ledger_id)) in latest {
            let current = match self.entities.get_ledger_reference(owner).await {
                Ok(current) => current,
                Err(err) => {
                    self.report_failure(&mut report, job_id, owner, ledger_id, err.to_string())
                        .await;
                    continue;
                }
            };
            if current.as_deref() == Some(ledger_id.as_str()) {
                continue;
            }

            match self.entities.set_ledger_reference(owner, &ledger_id).await {
                Ok(()) => {
                    report.repaired += 1;
                    metrics::record_reconciliation("repaired");
                    info!(
                        owner = %owner,
                        ledger_id = %ledger_id,
                        previous = ?current,
                        "[ax-04] Entity reconciled"
                    );
                    self.events
                        .publish(AnchorEvent::EntityReconciled { owner, ledger_id })
                        .await;
                }
                Err(err) => {
                    self.report_failure(&mut report, job_id, owner, ledger_id, err.to_string())
                        .await;
                }
            }
        }

        if report.repaired > 0 || report.failed > 0 {
            info!(
                checked = report.checked,
                repaired = report.repaired,
                failed = report.failed,
                "[ax-04] Reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    async fn report_failure(
        &self,
        report: &mut ReconcileReport,
        job_id: JobId,
        owner: EntityRef,
        ledger_id: String,
        reason: String,
    ) {
        report.failed += 1;
        metrics::record_reconciliation("failed");
        warn!(owner = %owner, ledger_id = %ledger_id, error = %reason, "[ax-04] Reconciliation failed");
        self.events
            .publish(AnchorEvent::ReconciliationRequired {
                job_id,
                owner,
                ledger_id,
                reason,
            })
            .await;
    }
}
