//! Explicit retry policy for external-call sites.
//!
//! One value object instead of ad-hoc decorators: every call site that
//! talks to an external service owns a policy describing its attempt
//! budget and backoff curve.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per subsequent attempt.
    pub base_delay: Duration,
    pub floor: Duration,
    pub ceiling: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, floor: Duration::ZERO, ceiling: Duration::MAX }
    }

    pub const fn with_bounds(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.floor = floor;
        self.ceiling = ceiling;
        self
    }

    /// Backoff before retrying after failed attempt number `attempt`
    /// (1-based). Doubling curve clamped to the policy bounds.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(factor);
        raw.clamp(self.floor, self.ceiling)
    }

    pub fn attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
