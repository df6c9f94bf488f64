//! # Retry Policy
//!
//! Bounded retry with a fixed interval, optionally jittered, shared by every
//! keyring step of a rotation.

use rand::Rng;
use std::time::Duration;

/// How often and how far apart a step is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts (or polls) before the step gives up
    pub max_attempts: u32,
    /// Pause between attempts
    pub interval: Duration,
    /// Add 0-50% of `interval` to each pause
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            jitter: false,
        }
    }

    #[must_use = "builder methods return a new policy"]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause before the next attempt
    pub fn delay(&self) -> Duration {
        let jitter_range = u64::try_from(self.interval.as_millis() / 2).unwrap_or(u64::MAX);
        if self.jitter && jitter_range > 0 {
            let jitter = rand::rng().random_range(0..=jitter_range);
            self.interval + Duration::from_millis(jitter)
        } else {
            self.interval
        }
    }

    /// Upper bound on the time the step can spend sleeping
    pub fn max_total_delay(&self) -> Duration {
        let pauses = self.max_attempts.saturating_sub(1);
        let per_pause = if self.jitter {
            self.interval + self.interval / 2
        } else {
            self.interval
        };
        per_pause.saturating_mul(pauses)
    }
}
