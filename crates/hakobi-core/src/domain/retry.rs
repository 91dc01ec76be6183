//! Retry policy: pure backoff computation for failed tasks.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with full-range jitter on top.
///
/// delay(attempt) = min(max_delay, base_delay * 2^(attempt-1)) + jitter,
/// jitter uniform in [0, base_delay). The jitter spreads out retries when
/// many tasks fail at once against the same dependency.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// What to report to the engine for one technical failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryDecision {
    /// `retries_remaining - 1`, floored at 0. At 0 the failure is still
    /// reported once more (so the engine records the final error), but the
    /// task is terminal from then on.
    pub retries_remaining: u32,

    /// How long the engine should wait before making the task claimable.
    pub retry_timeout: Duration,
}

impl RetryDecision {
    pub fn is_terminal(&self) -> bool {
        self.retries_remaining == 0
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay for the given 1-based attempt number.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        // 2^exp with exp clamped so the shift cannot overflow; the cap
        // kicks in long before that anyway.
        let exp = attempt.saturating_sub(1).min(31);
        let scaled = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        scaled + self.jitter()
    }

    /// Decide the next-attempt parameters for a task that just failed.
    ///
    /// The attempt number is derived from how far the retry budget has been
    /// consumed: a task still carrying its full `initial_retries` budget is
    /// on attempt 1.
    pub fn decide(&self, initial_retries: u32, retries_remaining: u32) -> RetryDecision {
        let attempt = initial_retries
            .saturating_sub(retries_remaining)
            .saturating_add(1);
        RetryDecision {
            retries_remaining: retries_remaining.saturating_sub(1),
            retry_timeout: self.next_delay(attempt),
        }
    }

    fn jitter(&self) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..base_ms))
    }
}
