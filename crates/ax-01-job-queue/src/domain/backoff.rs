//! Exponential backoff with jitter.
//!
//! `delay(n) = min(base * 2^(n-1), max) + U(0, jitter) * that`
//!
//! where `n` is the attempt that just failed (1-based).

use rand::Rng;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the delay added as random jitter, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(2_000),
            max: Duration::from_millis(60_000),
            jitter: 0.3,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Retry immediately.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Deterministic part of the delay after `attempt` failures.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay including jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        base + base.mul_f64(extra)
    }
}
