//! # Audit Trail Immutability
//!
//! Random mixes of ledger behaviour and entity outages, processed one job at
//! a time. Whatever happens, every job leaves exactly one transaction record
//! and no audit key is ever rewritten or removed.

#[cfg(test)]
mod tests {
    use crate::harness::{busy, fatal, file, file_request, Pipeline};
    use anchor_runtime::AnchorConfig;
    use ax_03_transaction_ledger::TransactionLedgerApi;
    use ax_04_anchor_workers::{MockLedgerClient, ProcessOutcome};
    use proptest::prelude::*;
    use shared_types::{JobId, JobKind, RecordStatus};

    const MAX_ATTEMPTS: u32 = 3;

    #[derive(Clone, Copy, Debug)]
    enum Behaviour {
        Success,
        TransientThenSuccess(usize),
        Fatal,
        Exhausted,
        DuplicateOfFirst,
    }

    fn behaviour() -> impl Strategy<Value = Behaviour> {
        prop_oneof![
            Just(Behaviour::Success),
            (1usize..MAX_ATTEMPTS as usize).prop_map(Behaviour::TransientThenSuccess),
            Just(Behaviour::Fatal),
            Just(Behaviour::Exhausted),
            Just(Behaviour::DuplicateOfFirst),
        ]
    }

    /// Process one job to its terminal outcome.
    async fn settle_one(p: &Pipeline) -> ProcessOutcome {
        loop {
            match p.run_next(JobKind::FileStore).await {
                ProcessOutcome::Rescheduled { .. } => continue,
                outcome => return outcome,
            }
        }
    }

    async fn run_plan(plan: Vec<(Behaviour, bool)>) -> Result<(), TestCaseError> {
        let p = Pipeline::new(
            AnchorConfig {
                max_attempts: MAX_ATTEMPTS,
                ..Pipeline::test_config()
            },
            MockLedgerClient::new(),
        );

        let mut jobs: Vec<(JobId, Behaviour)> = Vec::new();
        for (n, (behaviour, entity_down)) in plan.iter().copied().enumerate() {
            let n = n as u64;
            let payload = match behaviour {
                Behaviour::DuplicateOfFirst => file(0),
                _ => file(n),
            };
            match behaviour {
                Behaviour::TransientThenSuccess(times) => p.ledger.fail_times(times, busy()),
                Behaviour::Fatal => p.ledger.fail_times(1, fatal()),
                Behaviour::Exhausted => p.ledger.fail_times(MAX_ATTEMPTS as usize, busy()),
                Behaviour::Success | Behaviour::DuplicateOfFirst => {}
            }
            p.entities.set_failing(entity_down);

            let job_id = p.submit(file_request(n, payload)).await;
            let outcome = settle_one(&p).await;
            match behaviour {
                Behaviour::Fatal | Behaviour::Exhausted => {
                    let dead_lettered = matches!(outcome, ProcessOutcome::DeadLettered { .. });
                    prop_assert!(dead_lettered);
                }
                _ => {
                    let completed = matches!(outcome, ProcessOutcome::Completed { .. });
                    prop_assert!(completed);
                }
            }
            jobs.push((job_id, behaviour));
        }

        prop_assert!(p.settled().await);
        prop_assert_eq!(p.store.violations(), Vec::<String>::new());

        let count = p.container.records.record_count().unwrap();
        prop_assert_eq!(count, jobs.len());
        prop_assert_eq!(p.store.audit_writes(), 4 * count);

        let failed = p
            .container
            .records
            .query_by_status(RecordStatus::Failed)
            .unwrap();
        let expected_failed = jobs
            .iter()
            .filter(|(_, b)| matches!(b, Behaviour::Fatal | Behaviour::Exhausted))
            .count();
        prop_assert_eq!(failed.len(), expected_failed);
        prop_assert!(failed.iter().all(|r| r.cost == 0 && r.ledger_id.is_none()));

        for (job_id, _) in &jobs {
            let per_job = p
                .container
                .records
                .query_by_status(RecordStatus::Success)
                .unwrap()
                .into_iter()
                .chain(failed.iter().cloned())
                .filter(|r| r.job_id == *job_id)
                .count();
            prop_assert_eq!(per_job, 1);
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_every_job_leaves_one_immutable_record(
            plan in prop::collection::vec((behaviour(), any::<bool>()), 1..12)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(run_plan(plan))?;
        }
    }
}
