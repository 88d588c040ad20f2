//! Pure retry policy for calls to flaky dependencies.

use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `base * 2^(n-1)` after the n-th failure, capped at `max`.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Upper bound on any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Delay to wait after `failed_attempt` (1-based) failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let shift = failed_attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Wait schedule between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` tries with a constant `delay` between them.
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Returns the wait before the next attempt, or `None` when `failed_attempt`
    /// (1-based) was the last one allowed.
    pub fn next_delay(&self, failed_attempt: u32) -> Option<Duration> {
        if failed_attempt >= self.max_attempts.max(1) {
            None
        } else {
            Some(self.backoff.delay_after(failed_attempt))
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart.
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}
