//! # Delivery Properties
//!
//! Pool-level guarantees under load: every job reaches one terminal
//! outcome, no job runs twice at once, identical content is paid for once,
//! retries are bounded and the ledger call rate stays inside the window.

#[cfg(test)]
mod tests {
    use crate::harness::{busy, consensus_request, file, file_request, Pipeline};
    use anchor_runtime::AnchorConfig;
    use ax_01_job_queue::JobQueueApi;
    use ax_03_transaction_ledger::TransactionLedgerApi;
    use ax_04_anchor_workers::MockLedgerClient;
    use shared_types::{EntityRef, JobKind, RecordStatus, TransactionType};
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_every_job_gets_exactly_one_success_despite_flaky_ledger() {
        let p = Pipeline::new(
            AnchorConfig {
                max_attempts: 10,
                file_concurrency: 3,
                consensus_concurrency: 4,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new().with_latency(Duration::from_millis(20)),
        );
        p.ledger.fail_times(7, busy());
        for n in 0..10 {
            p.submit(file_request(n, file(n))).await;
            p.submit(consensus_request(n)).await;
        }

        p.run_until_settled().await;

        let records = p
            .container
            .records
            .query_by_status(RecordStatus::Success)
            .unwrap();
        assert_eq!(records.len(), 20);
        let owners: HashSet<EntityRef> = records.iter().map(|r| r.owner).collect();
        assert_eq!(owners.len(), 20);
        assert_eq!(p.container.records.record_count().unwrap(), 20);
        assert_eq!(p.ledger.call_count(), 27);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_job_is_processed_by_two_workers_at_once() {
        let p = Pipeline::new(
            AnchorConfig {
                file_concurrency: 8,
                consensus_concurrency: 8,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new().with_latency(Duration::from_millis(200)),
        );
        for n in 0..16 {
            p.submit(file_request(n, file(n))).await;
            p.submit(consensus_request(n)).await;
        }

        p.run_until_settled().await;

        assert_eq!(p.ledger.max_concurrent_per_content(), 1);
        assert_eq!(p.ledger.call_count(), 32);
        for n in 0..16 {
            assert_eq!(p.ledger.calls_for(&file(n).content_hash), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_content_is_paid_for_once() {
        let p = Pipeline::new(Pipeline::test_config(), MockLedgerClient::new().with_cost(5));
        let payload = file(1);
        p.submit(file_request(1, payload.clone())).await;
        p.submit(file_request(2, payload.clone())).await;

        p.run_until_settled().await;

        assert_eq!(p.ledger.calls_for(&payload.content_hash), 1);
        let records = p
            .container
            .records
            .query_by_content_hash(&payload.content_hash)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == RecordStatus::Success));
        assert_eq!(records[0].ledger_id, records[1].ledger_id);
        assert_eq!(records[1].tx_type, TransactionType::FileUploadReused);
        assert_eq!(records[1].cost, 0);
        assert_eq!(p.container.records.cost_summary().unwrap().total_cost, 5);
        assert_eq!(
            p.entities.reference(&EntityRef::document(1)),
            p.entities.reference(&EntityRef::document(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_at_max_attempts() {
        let p = Pipeline::new(
            AnchorConfig {
                max_attempts: 4,
                file_concurrency: 2,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new(),
        );
        p.ledger.always_fail(busy());
        for n in 0..3 {
            p.submit(file_request(n, file(n))).await;
        }

        p.run_until_settled().await;

        assert_eq!(p.ledger.call_count(), 12);
        assert_eq!(p.container.queue.dead_letters(None).await.len(), 3);
        assert_eq!(p.container.queue.stats(JobKind::FileStore).await.dead, 3);
        assert_eq!(
            p.container
                .records
                .query_by_status(RecordStatus::Failed)
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_call_rate_stays_inside_window() {
        let window = Duration::from_secs(1);
        let p = Pipeline::new(
            AnchorConfig {
                file_concurrency: 4,
                file_rate_max: 2,
                file_rate_window: window,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new(),
        );
        for n in 0..8 {
            p.submit(file_request(n, file(n))).await;
        }

        p.run_until_settled().await;

        let calls = p.ledger.calls();
        assert_eq!(calls.len(), 8);
        for triple in calls.windows(3) {
            assert!(triple[2].at.duration_since(triple[0].at) >= window);
        }
    }
}
