//! Exponential backoff between failed polls

use crate::config::BackoffConfig;
use std::time::Duration;

/// Doubling delay with a cap, reset on success
///
/// Starts at the base unit; each failure doubles it, so consecutive failures wait
/// 2, 4, 8, 16, 30, 30... units with the default 1s base and 30s cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let max = config.max();
        let base = config.base().min(max);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn on_failure(&mut self) -> Duration {
        self.current = self.current.saturating_mul(2).min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}
