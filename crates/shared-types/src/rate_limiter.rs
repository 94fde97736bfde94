//! # Rate Limiter
//!
//! Rolling-window limiter for calls against the external ledger network.
//!
//! ## Algorithm
//!
//! Sliding log: the timestamps of admitted starts inside the current window
//! are kept in a deque. A start is admitted only while fewer than `max`
//! timestamps are younger than `window`, so no window of length `window`
//! ever contains more than `max` starts. A token bucket would allow a burst
//! of `2 * max` across a window boundary; the ledger quota does not.
//!
//! The caller supplies `now`, which keeps the limiter deterministic under
//! test clocks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling-window admission limiter.
#[derive(Debug, Clone)]
pub struct RollingWindowLimiter {
    /// Maximum starts per window.
    max: u32,
    /// Window length.
    window: Duration,
    /// Admission timestamps, oldest first.
    starts: VecDeque<Instant>,
}

impl RollingWindowLimiter {
    /// Create a limiter admitting at most `max` starts per `window`.
    ///
    /// `max == 0` disables limiting.
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            starts: VecDeque::with_capacity(max as usize),
        }
    }

    /// Unlimited limiter.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.starts.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to admit a start at `now`.
    ///
    /// Returns `Err(wait)` with the time until the next slot frees up.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), Duration> {
        if self.max == 0 {
            return Ok(());
        }
        self.evict(now);
        if (self.starts.len() as u32) < self.max {
            self.starts.push_back(now);
            return Ok(());
        }
        Err(self.wait_time_at(now))
    }

    /// Time until a start would be admitted, without consuming a slot.
    pub fn wait_time_at(&mut self, now: Instant) -> Duration {
        if self.max == 0 {
            return Duration::ZERO;
        }
        self.evict(now);
        if (self.starts.len() as u32) < self.max {
            return Duration::ZERO;
        }
        self.starts
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Free slots at `now`.
    pub fn available_at(&mut self, now: Instant) -> u32 {
        if self.max == 0 {
            return u32::MAX;
        }
        self.evict(now);
        self.max.saturating_sub(self.starts.len() as u32)
    }
}
