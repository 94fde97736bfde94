//! # Job Queue Service
//!
//! In-process queue with write-through persistence.
//!
//! ## Guarantees
//!
//! - Every state change that must survive a crash is written to the store
//!   while the state lock is held, before memory is updated. A failed write
//!   leaves the queue exactly as it was.
//! - Claim ownership is a `LeaseToken`; ack, nack and release are refused
//!   for a stale token, so a reclaimed job has exactly one owner.
//! - Delays and leases live in memory only. After a restart every
//!   non-dead job is ready again with its attempt count preserved. A job
//!   that was held on its final attempt is dead-lettered instead and handed
//!   to the next `reclaim_expired` sweep.


use crate::adapters::JobStore;
use crate::domain::entry::{EntryState, JobEntry, PersistedJob};
use crate::domain::lane::{Lane, Refusal};
use crate::domain::{
    ClaimOutcome, ClaimedJob, DeadLetter, EnqueueOptions, JobStatus, LeaseToken, NackOutcome,
    QueueConfig, QueueStats, ReclaimOutcome,
};
use crate::error::{QueueError, QueueResult};
use crate::ports::inbound::JobQueueApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared_types::{
    AnchorJob, AnchorRequest, InMemoryKVStore, JobId, JobKind, KeyValueStore, LedgerError,
    LedgerErrorCode,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Current time on the tokio clock, so paused-time tests drive leases,
/// delays and rate windows.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

struct QueueState {
    entries: HashMap<JobId, JobEntry>,
    lanes: HashMap<JobKind, Lane>,
    next_seq: u64,
    /// Dead-lettered while opening, not yet reported.
    recovered: Vec<ReclaimOutcome>,
}

impl QueueState {
    fn new(config: &QueueConfig) -> Self {
        let lanes = JobKind::ALL
            .iter()
            .map(|kind| (*kind, Lane::new(&config.lane(*kind))))
            .collect();
        Self {
            entries: HashMap::new(),
            lanes,
            next_seq: 0,
            recovered: Vec::new(),
        }
    }

    fn lane(&mut self, kind: JobKind, config: &QueueConfig) -> &mut Lane {
        self.lanes
            .entry(kind)
            .or_insert_with(|| Lane::new(&config.lane(kind)))
    }

    fn insert(&mut self, entry: JobEntry, config: &QueueConfig) {
        let id = entry.job.job_id();
        let (priority, seq) = (entry.priority, entry.seq);
        let lane = self.lane(entry.kind(), config);
        match &entry.state {
            EntryState::Ready => lane.push_ready(priority, seq, id),
            EntryState::Delayed { until } => lane.push_delayed(*until, seq, id),
            EntryState::Claimed { .. } | EntryState::Dead(_) => {}
        }
        self.entries.insert(id, entry);
    }

    fn has_lease(&self, lease: &LeaseToken) -> bool {
        matches!(
            self.entries.get(&lease.job_id).map(|e| &e.state),
            Some(EntryState::Claimed { lease: held, .. }) if held == lease
        )
    }

    /// The entry held under `lease`, or `LeaseLost`.
    fn leased(&mut self, lease: &LeaseToken) -> QueueResult<&mut JobEntry> {
        match self.entries.get_mut(&lease.job_id) {
            Some(entry) if matches!(&entry.state, EntryState::Claimed { lease: held, .. } if held == lease) => {
                Ok(entry)
            }
            _ => Err(QueueError::LeaseLost {
                job_id: lease.job_id,
            }),
        }
    }
}

/// Durable anchoring job queue.
pub struct JobQueue {
    config: QueueConfig,
    store: JobStore,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl JobQueue {
    /// Open a queue over `kv`, recovering every persisted job.
    pub fn open(kv: Arc<dyn KeyValueStore>, config: QueueConfig) -> QueueResult<Self> {
        let store = JobStore::new(kv);
        let persisted = store.load_all()?;
        let mut state = QueueState::new(&config);

        let (mut ready, mut dead) = (0usize, 0usize);
        for PersistedJob {
            job,
            priority,
            seq,
            dead: dead_letter,
        } in persisted
        {
            state.next_seq = state.next_seq.max(seq + 1);
            let entry_state = match dead_letter {
                Some(letter) => {
                    dead += 1;
                    EntryState::Dead(letter)
                }
                None if job.attempt_count() >= config.max_attempts => {
                    // Held on its final attempt when the queue stopped.
                    let letter = DeadLetter {
                        job: job.clone(),
                        error: lease_expired(),
                        dead_at: Utc::now(),
                    };
                    store.put(&PersistedJob {
                        job: job.clone(),
                        priority,
                        seq,
                        dead: Some(letter.clone()),
                    })?;
                    warn!(
                        job_id = %job.job_id(),
                        attempts = job.attempt_count(),
                        "[ax-01] Job was claimed on its final attempt before restart, dead-lettered"
                    );
                    dead += 1;
                    state.recovered.push(ReclaimOutcome::DeadLettered(letter.clone()));
                    EntryState::Dead(letter)
                }
                None => {
                    ready += 1;
                    EntryState::Ready
                }
            };
            state.insert(
                JobEntry {
                    job,
                    priority,
                    seq,
                    state: entry_state,
                },
                &config,
            );
        }

        if ready + dead > 0 {
            info!(ready, dead, "[ax-01] Recovered persisted jobs");
        }

        Ok(Self {
            config,
            store,
            state: Mutex::new(state),
            notify: Notify::new(),
        })
    }

    /// Queue over a fresh in-memory store.
    pub fn in_memory(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::new(&config)),
            config,
            store: JobStore::new(Arc::new(InMemoryKVStore::new())),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn new_entry(
        &self,
        seq: u64,
        request: AnchorRequest,
        options: &EnqueueOptions,
        now: Instant,
    ) -> JobEntry {
        let job = AnchorJob::from_request(JobId::new(), request, Utc::now());
        let state = match options.delay {
            Some(delay) if !delay.is_zero() => EntryState::Delayed { until: now + delay },
            _ => EntryState::Ready,
        };
        JobEntry {
            job,
            priority: options.priority,
            seq,
            state,
        }
    }

    pub fn enqueue_at(
        &self,
        request: AnchorRequest,
        options: EnqueueOptions,
        now: Instant,
    ) -> QueueResult<JobId> {
        let mut state = self.state.lock();
        let entry = self.new_entry(state.next_seq, request, &options, now);
        let job_id = entry.job.job_id();

        self.store.put(&entry.to_persisted())?;

        debug!(
            job_id = %job_id,
            kind = %entry.kind(),
            owner = %entry.job.owner(),
            priority = entry.priority,
            "[ax-01] Job enqueued"
        );
        state.next_seq += 1;
        state.insert(entry, &self.config);
        drop(state);
        self.notify.notify_waiters();
        Ok(job_id)
    }

    pub fn enqueue_batch_at(
        &self,
        requests: Vec<AnchorRequest>,
        options: EnqueueOptions,
        now: Instant,
    ) -> QueueResult<Vec<JobId>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self.state.lock();
        let first_seq = state.next_seq;
        let entries: Vec<JobEntry> = requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| self.new_entry(first_seq + i as u64, request, &options, now))
            .collect();

        let persisted: Vec<PersistedJob> = entries.iter().map(JobEntry::to_persisted).collect();
        self.store.put_all(&persisted)?;

        let ids: Vec<JobId> = entries.iter().map(|e| e.job.job_id()).collect();
        state.next_seq += entries.len() as u64;
        for entry in entries {
            state.insert(entry, &self.config);
        }
        drop(state);

        debug!(count = ids.len(), "[ax-01] Batch enqueued");
        self.notify.notify_waiters();
        Ok(ids)
    }

    pub fn claim_at(&self, kind: JobKind, now: Instant) -> QueueResult<ClaimOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let lane = state
            .lanes
            .entry(kind)
            .or_insert_with(|| Lane::new(&self.config.lane(kind)));

        for (seq, id) in lane.take_due(now) {
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.state = EntryState::Ready;
                lane.push_ready(entry.priority, seq, id);
            }
        }

        if lane.is_paused() {
            return Ok(ClaimOutcome::Paused);
        }
        let Some((priority, seq, id)) = lane.peek_ready() else {
            return Ok(ClaimOutcome::Empty {
                next_ready_in: lane.next_due_in(now),
            });
        };
        if let Err(refusal) = lane.check_admission(now) {
            return Ok(match refusal {
                Refusal::Paused => ClaimOutcome::Paused,
                Refusal::Saturated => ClaimOutcome::Saturated,
                Refusal::Throttled(retry_after) => ClaimOutcome::Throttled { retry_after },
            });
        }

        let Some(entry) = state.entries.get_mut(&id) else {
            warn!(job_id = %id, "[ax-01] Ready index pointed at a missing job");
            lane.remove_ready(priority, seq, id);
            return Ok(ClaimOutcome::Empty {
                next_ready_in: lane.next_due_in(now),
            });
        };

        let mut job = entry.job.clone();
        let attempt = job.begin_attempt();
        self.store.put(&PersistedJob {
            job: job.clone(),
            priority,
            seq,
            dead: None,
        })?;

        let lease = LeaseToken::issue(id);
        let expires_at = now + self.config.visibility_timeout;
        entry.job = job;
        entry.state = EntryState::Claimed { lease, expires_at };
        lane.remove_ready(priority, seq, id);
        lane.admit(now);

        debug!(job_id = %id, kind = %kind, attempt, "[ax-01] Job claimed");
        Ok(ClaimOutcome::Claimed(ClaimedJob {
            job: entry.job.clone(),
            lease,
            expires_at,
        }))
    }

    pub fn ack_at(&self, lease: &LeaseToken, _now: Instant) -> QueueResult<()> {
        let mut state = self.state.lock();
        let kind = state.leased(lease)?.kind();

        self.store.delete(lease.job_id)?;

        state.entries.remove(&lease.job_id);
        state.lane(kind, &self.config).finish();
        drop(state);

        debug!(job_id = %lease.job_id, "[ax-01] Job acked");
        self.notify.notify_waiters();
        Ok(())
    }

    pub fn nack_at(
        &self,
        lease: &LeaseToken,
        error: &LedgerError,
        now: Instant,
    ) -> QueueResult<NackOutcome> {
        let mut state = self.state.lock();
        let entry = state.leased(lease)?;
        let attempts = entry.job.attempt_count();
        let kind = entry.kind();

        let outcome = if error.class().is_retryable() && attempts < self.config.max_attempts {
            let delay = self.config.backoff.delay(attempts);
            entry.state = if delay.is_zero() {
                EntryState::Ready
            } else {
                EntryState::Delayed { until: now + delay }
            };
            NackOutcome::Rescheduled {
                attempt: attempts,
                delay,
            }
        } else {
            let letter = DeadLetter {
                job: entry.job.clone(),
                error: error.clone(),
                dead_at: Utc::now(),
            };
            self.store.put(&PersistedJob {
                job: entry.job.clone(),
                priority: entry.priority,
                seq: entry.seq,
                dead: Some(letter.clone()),
            })?;
            entry.state = EntryState::Dead(letter);
            NackOutcome::DeadLettered { attempts }
        };

        let (priority, seq, entry_state) = (entry.priority, entry.seq, entry.state.clone());
        let lane = state.lane(kind, &self.config);
        lane.finish();
        match entry_state {
            EntryState::Ready => lane.push_ready(priority, seq, lease.job_id),
            EntryState::Delayed { until } => lane.push_delayed(until, seq, lease.job_id),
            _ => {}
        }
        drop(state);

        match &outcome {
            NackOutcome::Rescheduled { attempt, delay } => debug!(
                job_id = %lease.job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "[ax-01] Job rescheduled"
            ),
            NackOutcome::DeadLettered { attempts } => warn!(
                job_id = %lease.job_id,
                attempts,
                error = %error,
                "[ax-01] Job dead-lettered"
            ),
        }
        self.notify.notify_waiters();
        Ok(outcome)
    }

    /// Give a claim back. The attempt stays counted because the ledger
    /// may already have seen it; on the final attempt the job is
    /// dead-lettered.
    pub fn release_at(&self, lease: &LeaseToken, _now: Instant) -> QueueResult<ReclaimOutcome> {
        let mut state = self.state.lock();
        if !state.has_lease(lease) {
            return Err(QueueError::LeaseLost {
                job_id: lease.job_id,
            });
        }
        let outcome = self.requeue_or_bury(
            &mut state,
            lease.job_id,
            LedgerError::new(
                LedgerErrorCode::Other("RELEASED".into()),
                "claim released during shutdown on the final attempt",
            ),
        )?;
        drop(state);

        debug!(job_id = %lease.job_id, "[ax-01] Claim released");
        self.notify.notify_waiters();
        Ok(outcome)
    }

    /// Return an abandoned claim to the ready set, or dead-letter it when no
    /// attempts are left.
    fn requeue_or_bury(
        &self,
        state: &mut QueueState,
        id: JobId,
        error: LedgerError,
    ) -> QueueResult<ReclaimOutcome> {
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(QueueError::JobNotFound { job_id: id })?;
        let attempts = entry.job.attempt_count();
        let (kind, priority, seq) = (entry.kind(), entry.priority, entry.seq);

        if attempts < self.config.max_attempts {
            entry.state = EntryState::Ready;
            let lane = state.lane(kind, &self.config);
            lane.finish();
            lane.push_ready(priority, seq, id);
            return Ok(ReclaimOutcome::Requeued {
                job_id: id,
                attempts,
            });
        }

        let letter = DeadLetter {
            job: entry.job.clone(),
            error,
            dead_at: Utc::now(),
        };
        self.store.put(&PersistedJob {
            job: entry.job.clone(),
            priority,
            seq,
            dead: Some(letter.clone()),
        })?;
        entry.state = EntryState::Dead(letter.clone());
        state.lane(kind, &self.config).finish();
        Ok(ReclaimOutcome::DeadLettered(letter))
    }

    pub fn reclaim_expired_at(&self, now: Instant) -> QueueResult<Vec<ReclaimOutcome>> {
        let mut state = self.state.lock();
        let expired: Vec<JobId> = state
            .entries
            .iter()
            .filter_map(|(id, entry)| match entry.state {
                EntryState::Claimed { expires_at, .. } if expires_at <= now => Some(*id),
                _ => None,
            })
            .collect();

        let mut outcomes = std::mem::take(&mut state.recovered);
        for id in expired {
            match self.requeue_or_bury(&mut state, id, lease_expired()) {
                Ok(outcome) => {
                    match &outcome {
                        ReclaimOutcome::Requeued { attempts, .. } => {
                            warn!(job_id = %id, attempts, "[ax-01] Lease expired, job requeued")
                        }
                        ReclaimOutcome::DeadLettered(letter) => warn!(
                            job_id = %id,
                            attempts = letter.job.attempt_count(),
                            "[ax-01] Lease expired on final attempt, job dead-lettered"
                        ),
                    }
                    outcomes.push(outcome);
                }
                Err(e) => warn!(job_id = %id, error = %e, "[ax-01] Could not dead-letter expired job"),
            }
        }
        drop(state);

        if !outcomes.is_empty() {
            self.notify.notify_waiters();
        }
        Ok(outcomes)
    }

    pub fn status_at(&self, job_id: JobId, now: Instant) -> Option<JobStatus> {
        self.state
            .lock()
            .entries
            .get(&job_id)
            .map(|entry| entry.status(now))
    }

    pub fn stats_of(&self, kind: JobKind) -> QueueStats {
        let mut state = self.state.lock();
        let dead = state
            .entries
            .values()
            .filter(|e| e.kind() == kind && matches!(e.state, EntryState::Dead(_)))
            .count();
        let lane = state.lane(kind, &self.config);
        QueueStats {
            ready: lane.ready_len(),
            delayed: lane.delayed_len(),
            in_flight: lane.in_flight(),
            dead,
            paused: lane.is_paused(),
        }
    }

    pub fn set_paused(&self, kind: JobKind, paused: bool) {
        self.state.lock().lane(kind, &self.config).set_paused(paused);
        info!(kind = %kind, paused, "[ax-01] Lane pause state changed");
        if !paused {
            self.notify.notify_waiters();
        }
    }

    pub fn dead_letters_of(&self, kind: Option<JobKind>) -> Vec<DeadLetter> {
        let state = self.state.lock();
        let mut letters: Vec<DeadLetter> = state
            .entries
            .values()
            .filter(|e| kind.map_or(true, |k| e.kind() == k))
            .filter_map(|e| match &e.state {
                EntryState::Dead(letter) => Some(letter.clone()),
                _ => None,
            })
            .collect();
        letters.sort_by_key(|l| l.dead_at);
        letters
    }

    pub fn requeue_dead_letter_at(&self, job_id: JobId, _now: Instant) -> QueueResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound { job_id })?;
        if !matches!(entry.state, EntryState::Dead(_)) {
            return Err(QueueError::NotDeadLettered { job_id });
        }

        let mut job = entry.job.clone();
        job.reset_attempts();
        self.store.put(&PersistedJob {
            job: job.clone(),
            priority: entry.priority,
            seq: entry.seq,
            dead: None,
        })?;

        entry.job = job;
        entry.state = EntryState::Ready;
        let (kind, priority, seq) = (entry.kind(), entry.priority, entry.seq);
        state.lane(kind, &self.config).push_ready(priority, seq, job_id);
        drop(state);

        info!(job_id = %job_id, "[ax-01] Dead letter requeued by operator");
        self.notify.notify_waiters();
        Ok(())
    }

    /// Drop dead letters older than `older_than` from memory and the store.
    pub fn purge_dead_letters_at(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> QueueResult<usize> {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let mut state = self.state.lock();
        let stale: Vec<JobId> = state
            .entries
            .iter()
            .filter_map(|(id, entry)| match &entry.state {
                EntryState::Dead(letter) if letter.dead_at <= cutoff => Some(*id),
                _ => None,
            })
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }

        self.store.delete_all(&stale)?;
        for id in &stale {
            state.entries.remove(id);
        }
        drop(state);

        info!(purged = stale.len(), "[ax-01] Dead letters purged");
        Ok(stale.len())
    }

    /// Jobs not yet acked or dead-lettered, across all kinds.
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|e| !matches!(e.state, EntryState::Dead(_)))
            .count()
    }
}

#[async_trait]
impl JobQueueApi for JobQueue {
    async fn enqueue(&self, request: AnchorRequest, options: EnqueueOptions) -> QueueResult<JobId> {
        self.enqueue_at(request, options, now())
    }

    async fn enqueue_batch(
        &self,
        requests: Vec<AnchorRequest>,
        options: EnqueueOptions,
    ) -> QueueResult<Vec<JobId>> {
        self.enqueue_batch_at(requests, options, now())
    }

    async fn claim(&self, kind: JobKind) -> QueueResult<ClaimOutcome> {
        self.claim_at(kind, now())
    }

    async fn ack(&self, lease: &LeaseToken) -> QueueResult<()> {
        self.ack_at(lease, now())
    }

    async fn nack(&self, lease: &LeaseToken, error: &LedgerError) -> QueueResult<NackOutcome> {
        self.nack_at(lease, error, now())
    }

    async fn release(&self, lease: &LeaseToken) -> QueueResult<ReclaimOutcome> {
        self.release_at(lease, now())
    }

    async fn reclaim_expired(&self) -> QueueResult<Vec<ReclaimOutcome>> {
        self.reclaim_expired_at(now())
    }

    async fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.status_at(job_id, now())
    }

    async fn stats(&self, kind: JobKind) -> QueueStats {
        self.stats_of(kind)
    }

    async fn pause(&self, kind: JobKind) {
        self.set_paused(kind, true);
    }

    async fn resume(&self, kind: JobKind) {
        self.set_paused(kind, false);
    }

    async fn dead_letters(&self, kind: Option<JobKind>) -> Vec<DeadLetter> {
        self.dead_letters_of(kind)
    }

    async fn requeue_dead_letter(&self, job_id: JobId) -> QueueResult<()> {
        self.requeue_dead_letter_at(job_id, now())
    }

    async fn purge_dead_letters(&self, older_than: Duration) -> QueueResult<usize> {
        self.purge_dead_letters_at(older_than, Utc::now())
    }

    async fn wait_for_work(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;
    }
}

fn lease_expired() -> LedgerError {
    LedgerError::new(
        LedgerErrorCode::Other("LEASE_EXPIRED".into()),
        "visibility timeout elapsed without ack on the final attempt",
    )
}
