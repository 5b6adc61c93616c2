//! Capped exponential backoff policy for flush retries.
//!
//! An explicit object rather than ad hoc sleeps inside the retry loop, so
//! monotonicity and the cap are testable in isolation.

use std::time::Duration;

/// Exponential backoff: `initial * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next retry; consecutive calls are non-decreasing up
    /// to the cap.
    pub fn next_delay(&mut self) -> Duration {
        // Exponent clamped so the shift cannot overflow; the cap dominates
        // far earlier for any sane configuration.
        let exp = self.attempt.min(32);
        let delay = self
            .initial
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Consecutive failures so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Back to the initial delay after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
