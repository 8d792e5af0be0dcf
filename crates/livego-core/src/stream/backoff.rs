//! Exponential reconnect backoff for the push channel

use std::time::Duration;

use crate::config::{DEFAULT_BASE_INTERVAL_MS, DEFAULT_MAX_ATTEMPTS};

/// When and how often the push channel retries after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Consecutive failed attempts tolerated before giving up
    pub max_attempts: u32,
    pub base_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_interval: Duration::from_millis(DEFAULT_BASE_INTERVAL_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay before the reconnect that follows `attempts` earlier retries.
    ///
    /// `base * 2^attempts`, saturating: base, 2·base, 4·base, ...
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base_interval.saturating_mul(factor)
    }

    /// Whether another reconnect may be scheduled after `attempts` retries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.enabled && attempts < self.max_attempts
    }
}
