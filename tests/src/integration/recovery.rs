//! # Recovery
//!
//! Crash and outage handling: restart over a persisted queue, abandoned
//! leases, crashes between the ledger call and the ack, entity updates lost
//! after the ledger was paid.

#[cfg(test)]
mod tests {
    use crate::harness::{file, file_request, Pipeline, RecordingStore};
    use anchor_runtime::AnchorConfig;
    use ax_01_job_queue::{JobQueueApi, JobStatus, QueueError};
    use ax_03_transaction_ledger::TransactionLedgerApi;
    use ax_04_anchor_workers::{AnchoringApi, LedgerClient, MockLedgerClient, ReconcileReport};
    use shared_types::{
        AnchorPayload, ConsensusEnvelope, ConsensusEventType, ContentHash, EntityRef, JobKind,
        LedgerReceipt, RecordStatus, TransactionRecord, TransactionType, UserId,
    };
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_claimed_jobs_survive_restart() {
        let store = Arc::new(RecordingStore::new());
        let ledger = Arc::new(MockLedgerClient::new());

        let first = Pipeline::open(Pipeline::test_config(), ledger.clone(), store.clone());
        for n in 0..3 {
            first.submit(file_request(n, file(n))).await;
        }
        let abandoned = first
            .container
            .queue
            .claim(JobKind::FileStore)
            .await
            .unwrap()
            .into_claimed()
            .unwrap();
        drop(first);

        let second = Pipeline::open(Pipeline::test_config(), ledger.clone(), store.clone());
        assert_eq!(
            second.container.queue.status(abandoned.job_id()).await,
            Some(JobStatus::Ready { attempts: 1 })
        );

        second.run_until_settled().await;

        let records = second
            .container
            .records
            .query_by_status(RecordStatus::Success)
            .unwrap();
        assert_eq!(records.len(), 3);
        let recovered = records
            .iter()
            .find(|r| r.job_id == abandoned.job_id())
            .unwrap();
        assert_eq!(recovered.metadata["attempts"], 2);
        assert_eq!(ledger.call_count(), 3);
        assert!(store.violations().is_empty());
    }

    /// Claim the next file job, pay the ledger for it and write its SUCCESS
    /// record, then stop as if the process died before the entity update
    /// and the ack.
    async fn pay_and_crash(p: Pipeline) -> LedgerReceipt {
        let claimed = p
            .container
            .queue
            .claim(JobKind::FileStore)
            .await
            .unwrap()
            .into_claimed()
            .unwrap();
        let AnchorPayload::FileStore(payload) = claimed.job.payload() else {
            panic!("expected a file job");
        };
        let receipt = p.ledger.upload_file(payload).await.unwrap();
        p.container
            .records
            .append(TransactionRecord::success(&claimed.job, &receipt))
            .unwrap();
        drop(p);
        receipt
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_before_ack_does_not_pay_twice() {
        let store = Arc::new(RecordingStore::new());
        let ledger = Arc::new(MockLedgerClient::new());

        let first = Pipeline::open(Pipeline::test_config(), ledger.clone(), store.clone());
        first.submit(file_request(8, file(8))).await;
        let receipt = pay_and_crash(first).await;

        let second = Pipeline::open(Pipeline::test_config(), ledger.clone(), store.clone());
        second.run_until_settled().await;

        assert_eq!(ledger.call_count(), 1);
        let records = second
            .container
            .records
            .query_by_owner(&EntityRef::document(8))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cost, 5);
        assert_eq!(
            second.entities.reference(&EntityRef::document(8)),
            Some(receipt.ledger_id)
        );
        assert_eq!(second.container.records.cost_summary().unwrap().total_cost, 5);
        assert!(store.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_on_final_attempt_after_payment_still_completes() {
        let store = Arc::new(RecordingStore::new());
        let ledger = Arc::new(MockLedgerClient::new());
        let config = AnchorConfig {
            max_attempts: 1,
            ..Pipeline::test_config()
        };

        let first = Pipeline::open(config.clone(), ledger.clone(), store.clone());
        let job_id = first.submit(file_request(9, file(9))).await;
        let receipt = pay_and_crash(first).await;

        // Reopened as dead: the crash happened during its only attempt.
        let second = Pipeline::open(config, ledger.clone(), store.clone());
        assert!(matches!(
            second.container.queue.status(job_id).await,
            Some(JobStatus::DeadLettered { attempts: 1, .. })
        ));

        second.container.processor.reap_expired().await.unwrap();
        second.run_until_settled().await;

        assert_eq!(ledger.call_count(), 1);
        assert_eq!(second.container.queue.status(job_id).await, None);
        let records = second
            .container
            .records
            .query_by_owner(&EntityRef::document(9))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(
            second.entities.reference(&EntityRef::document(9)),
            Some(receipt.ledger_id)
        );
        assert!(store.violations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_on_final_attempt_before_payment_is_recorded_failed() {
        let store = Arc::new(RecordingStore::new());
        let ledger = Arc::new(MockLedgerClient::new());
        let config = AnchorConfig {
            max_attempts: 1,
            ..Pipeline::test_config()
        };

        let first = Pipeline::open(config.clone(), ledger.clone(), store.clone());
        let job_id = first.submit(file_request(10, file(10))).await;
        first
            .container
            .queue
            .claim(JobKind::FileStore)
            .await
            .unwrap()
            .into_claimed()
            .unwrap();
        drop(first);

        let second = Pipeline::open(config, ledger.clone(), store.clone());
        assert!(second
            .container
            .queue
            .claim(JobKind::FileStore)
            .await
            .unwrap()
            .into_claimed()
            .is_none());
        assert_eq!(second.container.processor.reap_expired().await.unwrap(), 1);

        assert_eq!(ledger.call_count(), 0);
        let failed = second
            .container
            .records
            .query_by_status(RecordStatus::Failed)
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job_id, job_id);
        assert_eq!(failed[0].metadata["error_code"], "LEASE_EXPIRED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_claim_is_redelivered_after_visibility_timeout() {
        let p = Pipeline::new(
            AnchorConfig {
                visibility_timeout: Duration::from_secs(2),
                ledger_timeout: Duration::from_secs(1),
                reap_interval: Duration::from_millis(500),
                ..Pipeline::test_config()
            },
            MockLedgerClient::new(),
        );
        let job_id = p.submit(file_request(1, file(1))).await;
        let stale = p
            .container
            .queue
            .claim(JobKind::FileStore)
            .await
            .unwrap()
            .into_claimed()
            .unwrap();

        p.run_until_settled().await;

        assert_eq!(p.ledger.call_count(), 1);
        let records = p
            .container
            .records
            .query_by_owner(&EntityRef::document(1))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(records[0].metadata["attempts"], 2);

        assert_eq!(
            p.container.queue.ack(&stale.lease).await,
            Err(QueueError::LeaseLost { job_id })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciler_repairs_entity_lost_after_payment() {
        let p = Pipeline::new(Pipeline::test_config(), MockLedgerClient::new());
        p.entities.set_failing(true);
        p.submit(file_request(4, file(4))).await;

        p.run_until_settled().await;
        assert_eq!(p.entities.reference(&EntityRef::document(4)), None);

        p.entities.set_failing(false);
        let report = p.container.reconciler.run_once().await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                checked: 1,
                repaired: 1,
                failed: 0,
            }
        );

        let record = &p
            .container
            .records
            .query_by_owner(&EntityRef::document(4))
            .unwrap()[0];
        assert_eq!(p.entities.reference(&EntityRef::document(4)), record.ledger_id);
        assert_eq!(p.ledger.call_count(), 1);

        let again = p.container.reconciler.run_once().await.unwrap();
        assert_eq!(again.repaired, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_event_is_anchored_on_default_topic() {
        let p = Pipeline::new(Pipeline::test_config(), MockLedgerClient::new());
        let envelope = ConsensusEnvelope::new(
            ConsensusEventType::ConsultationCreated,
            EntityRef::consultation(21),
            UserId(3),
            ContentHash::of(b"consultation 21"),
        );

        let job_id = p.container.client.anchor_event(&envelope).await.unwrap();
        p.run_until_settled().await;

        let records = p
            .container
            .records
            .query_by_owner(&EntityRef::consultation(21))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job_id, job_id);
        assert_eq!(records[0].tx_type, TransactionType::ConsensusMessage);
        assert_eq!(
            p.entities.reference(&EntityRef::consultation(21)),
            records[0].ledger_id
        );
    }
}
