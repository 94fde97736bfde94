//! Per-kind lane: ordering of claimable jobs and admission control.

use super::config::LaneConfig;
use shared_types::{JobId, RollingWindowLimiter};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Why a lane refused to hand out a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refusal {
    Paused,
    Saturated,
    Throttled(Duration),
}

pub(crate) struct Lane {
    /// `(priority, seq, id)`: lowest priority value first, then FIFO.
    ready: BTreeSet<(u32, u64, JobId)>,
    /// `(ready_at, seq, id)`.
    delayed: BTreeSet<(Instant, u64, JobId)>,
    in_flight: usize,
    max_in_flight: usize,
    limiter: RollingWindowLimiter,
    paused: bool,
}

impl Lane {
    pub fn new(config: &LaneConfig) -> Self {
        Self {
            ready: BTreeSet::new(),
            delayed: BTreeSet::new(),
            in_flight: 0,
            max_in_flight: config.max_in_flight,
            limiter: RollingWindowLimiter::new(config.rate_max, config.rate_window),
            paused: false,
        }
    }

    pub fn push_ready(&mut self, priority: u32, seq: u64, id: JobId) {
        self.ready.insert((priority, seq, id));
    }

    pub fn remove_ready(&mut self, priority: u32, seq: u64, id: JobId) -> bool {
        self.ready.remove(&(priority, seq, id))
    }

    pub fn push_delayed(&mut self, until: Instant, seq: u64, id: JobId) {
        self.delayed.insert((until, seq, id));
    }

    pub fn remove_delayed(&mut self, until: Instant, seq: u64, id: JobId) -> bool {
        self.delayed.remove(&(until, seq, id))
    }

    /// Delayed jobs whose time has come, in due order.
    pub fn take_due(&mut self, now: Instant) -> Vec<(u64, JobId)> {
        let mut due = Vec::new();
        while let Some(&(until, seq, id)) = self.delayed.first() {
            if until > now {
                break;
            }
            self.delayed.pop_first();
            due.push((seq, id));
        }
        due
    }

    pub fn next_due_in(&self, now: Instant) -> Option<Duration> {
        self.delayed
            .first()
            .map(|(until, _, _)| until.saturating_duration_since(now))
    }

    pub fn peek_ready(&self) -> Option<(u32, u64, JobId)> {
        self.ready.first().copied()
    }

    /// Check admission without consuming a rate slot.
    pub fn check_admission(&mut self, now: Instant) -> Result<(), Refusal> {
        if self.paused {
            return Err(Refusal::Paused);
        }
        if self.in_flight >= self.max_in_flight {
            return Err(Refusal::Saturated);
        }
        let wait = self.limiter.wait_time_at(now);
        if !wait.is_zero() {
            return Err(Refusal::Throttled(wait));
        }
        Ok(())
    }

    /// Record an admitted start. Call only after `check_admission` passed
    /// at the same `now`.
    pub fn admit(&mut self, now: Instant) {
        // Cannot fail after a passing check at the same instant.
        let _ = self.limiter.try_acquire_at(now);
        self.in_flight += 1;
    }

    pub fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
