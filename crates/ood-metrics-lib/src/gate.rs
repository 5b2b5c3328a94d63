//! Refresh throttling
//!
//! Decides whether enough wall-clock time has passed since the last
//! successful refresh to justify sampling the system again.

use std::time::{Duration, Instant};

/// Minimum-interval gate in front of the refresh cycle
#[derive(Debug, Clone)]
pub struct PollGate {
    last_refresh: Option<Instant>,
    min_interval: Duration,
}

impl PollGate {
    /// Create a gate that has never fired
    pub fn new(min_interval_secs: u64) -> Self {
        Self {
            last_refresh: None,
            min_interval: Duration::from_secs(min_interval_secs),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// True when no refresh has happened yet or the interval has been exceeded
    pub fn should_refresh(&self, now: Instant) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.min_interval,
        }
    }

    /// Record a completed refresh
    pub fn record_refresh(&mut self, now: Instant) {
        self.last_refresh = Some(now);
    }
}
