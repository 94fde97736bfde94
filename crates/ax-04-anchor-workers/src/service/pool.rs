//! # Worker Pool
//!
//! A fixed number of worker tasks per job kind plus one lease reaper.
//!
//! Each worker holds at most one claim. Admission refusals from the queue
//! are honoured by waiting: `Throttled` sleeps until the rate window
//! reopens, the other refusals wait for queue activity or the poll
//! interval.
//!
//! ## Shutdown
//!
//! 1. Stop signal: workers finish their current job and exit.
//! 2. After `drain_timeout`, the abort signal cancels jobs still running
//!    and their leases are released back to the queue. A released job
//!    keeps the attempt it was on; the ledger may already have seen it.
//!
//! An ungraceful stop skips both; the visibility timeout requeues the jobs.

use crate::domain::{ShutdownReport, WorkerConfig};
use crate::service::processor::JobProcessor;
use ax_01_job_queue::ClaimOutcome;
use parking_lot::Mutex;
use shared_types::JobKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct WorkerPool {
    processor: Arc<JobProcessor>,
    config: WorkerConfig,
    stop_tx: watch::Sender<bool>,
    abort_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(processor: Arc<JobProcessor>) -> Self {
        let config = processor.config().clone();
        let (stop_tx, _) = watch::channel(false);
        let (abort_tx, _) = watch::channel(false);
        Self {
            processor,
            config,
            stop_tx,
            abort_tx,
            handles: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn the workers and the reaper. Must run inside a tokio runtime.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("[ax-04] Worker pool already started");
            return;
        }

        for kind in JobKind::ALL {
            let count = self.config.workers_for(kind);
            for worker_id in 0..count {
                let worker = Worker {
                    id: worker_id,
                    kind,
                    processor: self.processor.clone(),
                    poll_interval: self.config.poll_interval,
                    stop: self.stop_tx.subscribe(),
                    abort: self.abort_tx.subscribe(),
                    in_flight: self.in_flight.clone(),
                    released: self.released.clone(),
                };
                handles.push(tokio::spawn(worker.run()));
            }
            info!(kind = %kind, workers = count, "[ax-04] Workers started");
        }

        handles.push(tokio::spawn(run_reaper(
            self.processor.clone(),
            self.config.reap_interval,
            self.stop_tx.subscribe(),
        )));
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty() && !*self.stop_tx.borrow()
    }

    /// Jobs currently being processed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop claiming, drain, then release whatever is still running.
    pub async fn shutdown(&self) -> ShutdownReport {
        let handles = std::mem::take(&mut *self.handles.lock());
        self.stop_tx.send_replace(true);
        info!(
            in_flight = self.in_flight(),
            drain_timeout_ms = self.config.drain_timeout.as_millis() as u64,
            "[ax-04] Draining worker pool"
        );

        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut pending = Vec::new();
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "[ax-04] Worker task failed"),
                Err(_) => pending.push(handle),
            }
        }

        let drained = pending.is_empty();
        if !drained {
            warn!(
                remaining = pending.len(),
                "[ax-04] Drain timeout reached, releasing in-flight claims"
            );
            self.abort_tx.send_replace(true);
            for handle in pending {
                if let Err(err) = handle.await {
                    error!(error = %err, "[ax-04] Worker task failed");
                }
            }
        }

        let report = ShutdownReport {
            drained,
            released: self.released.load(Ordering::SeqCst),
        };
        info!(
            drained = report.drained,
            released = report.released,
            "[ax-04] Worker pool stopped"
        );
        report
    }
}

/// True once the pool asked workers to stop, or the pool is gone.
fn signalled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

async fn wait_abort(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|abort| *abort).await;
}

enum Idle {
    /// Wake early on queue activity.
    UntilWork(Duration),
    /// Rate window closed; activity does not help.
    Sleep(Duration),
}

struct Worker {
    id: usize,
    kind: JobKind,
    processor: Arc<JobProcessor>,
    poll_interval: Duration,
    stop: watch::Receiver<bool>,
    abort: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(mut self) {
        let queue = self.processor.dependencies().queue.clone();
        debug!(worker = self.id, kind = %self.kind, "[ax-04] Worker running");

        while !signalled(&self.stop) {
            let idle = match queue.claim(self.kind).await {
                Ok(ClaimOutcome::Claimed(claimed)) => {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    let lease = claimed.lease;
                    // Biased: the job starts before an abort can be observed.
                    tokio::select! {
                        biased;
                        result = self.processor.process(claimed) => {
                            if let Err(err) = result {
                                error!(
                                    worker = self.id,
                                    job_id = %lease.job_id,
                                    error = %err,
                                    "[ax-04] Job outcome not reported, lease will expire"
                                );
                            }
                        }
                        _ = wait_abort(&mut self.abort) => {
                            match queue.release(&lease).await {
                                Ok(outcome) => {
                                    self.released.fetch_add(1, Ordering::SeqCst);
                                    info!(job_id = %lease.job_id, "[ax-04] Released unfinished job");
                                    self.processor.settle_abandoned(outcome).await;
                                }
                                Err(err) => warn!(
                                    job_id = %lease.job_id,
                                    error = %err,
                                    "[ax-04] Release failed, lease will expire"
                                ),
                            }
                        }
                    }
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }
                Ok(ClaimOutcome::Empty { next_ready_in }) => Idle::UntilWork(
                    next_ready_in.map_or(self.poll_interval, |d| d.min(self.poll_interval)),
                ),
                Ok(ClaimOutcome::Saturated) | Ok(ClaimOutcome::Paused) => {
                    Idle::UntilWork(self.poll_interval)
                }
                Ok(ClaimOutcome::Throttled { retry_after }) => Idle::Sleep(retry_after),
                Err(err) => {
                    warn!(worker = self.id, kind = %self.kind, error = %err, "[ax-04] Claim failed");
                    Idle::Sleep(self.poll_interval)
                }
            };

            match idle {
                Idle::UntilWork(wait) => tokio::select! {
                    _ = queue.wait_for_work(wait) => {}
                    _ = self.stop.changed() => {}
                },
                Idle::Sleep(wait) => tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.stop.changed() => {}
                },
            }
        }

        debug!(worker = self.id, kind = %self.kind, "[ax-04] Worker stopped");
    }
}

async fn run_reaper(
    processor: Arc<JobProcessor>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => {}
        }
        if signalled(&stop) {
            break;
        }
        match processor.reap_expired().await {
            Ok(0) => {}
            Ok(count) => debug!(count, "[ax-04] Expired leases reclaimed"),
            Err(err) => warn!(error = %err, "[ax-04] Lease sweep failed"),
        }
    }
}
