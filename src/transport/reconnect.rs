// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::time::Duration;

/// How the connection retries after a retryable failure.
///
/// The delay doubles per attempt up to `2^max_backoff_exponent` times the
/// base delay. `max_attempts: None` retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Give up after this many consecutive failed attempts
    pub max_attempts: Option<u32>,
    /// Cap on the doubling (4 means at most 16x the base delay)
    pub max_backoff_exponent: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 5000,
            max_attempts: Some(10),
            max_backoff_exponent: 4,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    /// A policy that retries forever.
    pub fn unbounded(base_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` to give up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        let attempt = attempt.max(1);
        if let Some(max) = self.max_attempts
            && attempt > max
        {
            return None;
        }
        let exponent = (attempt - 1).min(self.max_backoff_exponent).min(32);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Some(Duration::from_millis(delay_ms))
    }
}
