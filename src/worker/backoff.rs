//! Exponential backoff for idle or failing poll loops.

use std::time::Duration;

/// Doubling delay, capped at a maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff starting at `base` and never exceeding `max`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Returns the next delay and advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(2_u32.saturating_pow(self.attempt))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Returns to the base delay.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the number of consecutive delays handed out since the last
    /// reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
