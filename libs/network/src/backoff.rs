//! Exponential reconnect backoff

use std::time::Duration;

/// Delay between reconnect attempts.
///
/// Starts at `base`, doubles after every failed attempt up to `max`, and drops
/// back to `base` on a successful connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    /// A `max` below `base` is raised to `base`
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            failures: 0,
        }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    /// Delay to wait now; advances the state for the next failure
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |doubled| doubled.min(self.max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
