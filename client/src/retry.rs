use crate::defaults::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_ATTEMPTS};
use std::time::Duration;

/// Bounded retry with a fixed interval (no backoff growth).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on the time spent waiting between attempts.
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}
