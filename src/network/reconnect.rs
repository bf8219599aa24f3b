//! Bounded reconnection with capped exponential backoff

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Decides whether and when an automatic reconnection happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    enabled: bool,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            enabled: true,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Never reconnect automatically
    pub fn disabled() -> Self {
        Self::from_config(&ReconnectConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.max_attempts > 0
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether attempt number `attempt` (1-based) may run
    pub fn allows(&self, attempt: u32) -> bool {
        self.is_enabled() && attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before attempt number `attempt` (1-based): `base * 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
