//! # Anchoring Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Enqueue, claim, ack one job | < 50µs |
//! | Cache hit lookup | < 1µs |
//! | Transaction record append | < 50µs |

use ax_01_job_queue::{EnqueueOptions, JobQueue, QueueConfig};
use ax_02_result_cache::{CacheConfig, ResultCache};
use ax_03_transaction_ledger::{KvTransactionLedger, TransactionLedgerApi};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_types::{
    AnchorJob, AnchorPayload, AnchorRequest, CachedAnchor, ContentHash, EntityRef, FilePayload,
    JobId, JobKind, LedgerReceipt, TransactionRecord, TxId, UserId,
};
use std::time::Instant;

fn request(n: u64) -> AnchorRequest {
    AnchorRequest::new(
        AnchorPayload::FileStore(FilePayload::new(
            format!("scan {n}").into_bytes(),
            format!("scan-{n}.png"),
            "image/png",
        )),
        EntityRef::document(n),
        UserId(1),
    )
}

fn bench_queue_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ax-01-job-queue");

    let queue = JobQueue::in_memory(QueueConfig::for_testing());
    let mut n = 0u64;
    group.bench_function("enqueue_claim_ack", |b| {
        b.iter(|| {
            n += 1;
            let now = Instant::now();
            queue
                .enqueue_at(request(n), EnqueueOptions::default(), now)
                .unwrap();
            let claimed = queue
                .claim_at(JobKind::FileStore, now)
                .unwrap()
                .into_claimed()
                .unwrap();
            queue.ack_at(&claimed.lease, now).unwrap();
        })
    });

    for backlog in [100usize, 1_000, 10_000] {
        let queue = JobQueue::in_memory(QueueConfig::for_testing());
        let now = Instant::now();
        for i in 0..backlog as u64 {
            queue
                .enqueue_at(request(i), EnqueueOptions::default(), now)
                .unwrap();
        }
        group.bench_with_input(BenchmarkId::new("stats_with_backlog", backlog), &queue, |b, q| {
            b.iter(|| black_box(q.stats_of(JobKind::FileStore)))
        });
    }

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("ax-02-result-cache");

    for size in [1_000usize, 10_000] {
        let cache = ResultCache::new(CacheConfig::new(size, None));
        let now = Instant::now();
        let hashes: Vec<ContentHash> = (0..size)
            .map(|i| ContentHash::of(format!("content {i}").as_bytes()))
            .collect();
        for (i, hash) in hashes.iter().enumerate() {
            cache.put_at(
                *hash,
                CachedAnchor {
                    ledger_id: format!("0.0.{i}"),
                    tx_id: TxId::new(format!("0.0.2@{i}.0")),
                },
                now,
            );
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("hit", size), &hashes, |b, hashes| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % hashes.len();
                black_box(cache.get_at(&hashes[i], now))
            })
        });

        let missing = ContentHash::of(b"never stored");
        group.bench_with_input(BenchmarkId::new("miss", size), &missing, |b, hash| {
            b.iter(|| black_box(cache.get_at(hash, now)))
        });
    }

    group.finish();
}

fn bench_record_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("ax-03-transaction-ledger");

    let records = KvTransactionLedger::in_memory();
    let mut n = 0u64;
    group.bench_function("append_success", |b| {
        b.iter(|| {
            n += 1;
            let mut job = AnchorJob::from_request(JobId::new(), request(n), chrono::Utc::now());
            job.begin_attempt();
            let receipt = LedgerReceipt {
                ledger_id: format!("0.0.{n}"),
                tx_id: TxId::new(format!("0.0.2@{n}.0")),
                cost: 5,
                consensus_timestamp: None,
            };
            records
                .append(TransactionRecord::success(&job, &receipt))
                .unwrap();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_round_trip,
    bench_cache_lookup,
    bench_record_append
);
criterion_main!(benches);
