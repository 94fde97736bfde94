//! # Anchoring Scenarios
//!
//! One file upload through the whole pipeline, driven by a worker pool:
//!
//! 1. Ledger succeeds at once
//! 2. Ledger fails transiently twice, then succeeds
//! 3. Ledger always fails, three attempts allowed

#[cfg(test)]
mod tests {
    use crate::harness::{busy, drain, file, file_request, Pipeline};
    use anchor_runtime::AnchorConfig;
    use ax_01_job_queue::{JobQueueApi, JobStatus};
    use ax_02_result_cache::ResultCacheApi;
    use ax_03_transaction_ledger::TransactionLedgerApi;
    use ax_04_anchor_workers::MockLedgerClient;
    use shared_bus::AnchorEvent;
    use shared_types::{EntityRef, JobKind, RecordStatus};

    #[tokio::test(start_paused = true)]
    async fn test_file_store_success_updates_everything() {
        let p = Pipeline::new(Pipeline::test_config(), MockLedgerClient::new().with_cost(5));
        let payload = file(1);
        let hash = payload.content_hash;
        let job_id = p.submit(file_request(1, payload)).await;

        let report = p.run_until_settled().await;
        assert!(report.drained);

        let records = p
            .container
            .records
            .query_by_content_hash(&hash)
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.cost, 5);
        assert_eq!(record.job_id, job_id);
        assert_eq!(record.metadata["content_hash"], hash.to_hex());

        let file_id = record.ledger_id.clone().unwrap();
        assert_eq!(
            p.container.cache.get(&hash).map(|cached| cached.ledger_id),
            Some(file_id.clone())
        );
        assert_eq!(p.entities.reference(&EntityRef::document(1)), Some(file_id));
        assert_eq!(p.container.queue.status(job_id).await, None);
        assert_eq!(p.container.queue.stats(JobKind::FileStore).await.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let p = Pipeline::new(
            AnchorConfig {
                max_attempts: 5,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new(),
        );
        p.ledger.fail_times(2, busy());
        let mut sub = p.subscribe();
        p.submit(file_request(1, file(1))).await;

        p.run_until_settled().await;

        assert_eq!(p.ledger.call_count(), 3);
        let records = p
            .container
            .records
            .query_by_owner(&EntityRef::document(1))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(records[0].metadata["attempts"], 3);

        let events = drain(&mut sub);
        let retries = events
            .iter()
            .filter(|e| matches!(e, AnchorEvent::JobRetryScheduled { .. }))
            .count();
        assert_eq!(retries, 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, AnchorEvent::JobCompleted { attempts: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_dead_letters_after_three_attempts() {
        let p = Pipeline::new(
            AnchorConfig {
                max_attempts: 3,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new(),
        );
        p.ledger.always_fail(busy());
        let job_id = p.submit(file_request(1, file(1))).await;

        p.run_until_settled().await;

        assert_eq!(p.ledger.call_count(), 3);
        let records = p
            .container
            .records
            .query_by_owner(&EntityRef::document(1))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Failed);
        assert_eq!(records[0].cost, 0);
        assert_eq!(records[0].metadata["error_code"], "BUSY");

        assert!(matches!(
            p.container.queue.status(job_id).await,
            Some(JobStatus::DeadLettered { attempts: 3, .. })
        ));
        let dead = p.container.queue.dead_letters(Some(JobKind::FileStore)).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(p.entities.reference(&EntityRef::document(1)), None);
        assert_eq!(p.entities.write_count(), 0);
    }
}
