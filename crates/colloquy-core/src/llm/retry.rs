//! Bounded exponential backoff for transient rate limiting.

use std::time::Duration;

use colloquy_types::config::RetryConfig;

/// Per-backend retry policy, applied by the orchestrator to `rate_limited`
/// failures that happen before the first chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let base_delay = Duration::from_millis(config.base_delay_ms);
        Self {
            max_retries: config.max_retries,
            base_delay,
            multiplier: config.multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms).max(base_delay),
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` when the
    /// request should fail now.
    ///
    /// A server-suggested `retry_after_ms` wins when it is longer than the
    /// computed backoff. A hint beyond `max_delay` means the window will not
    /// reopen soon enough to hold the request, so no retry is scheduled.
    pub fn next_delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Option<Duration> {
        if !self.allows(attempt) {
            return None;
        }
        let factor = self.multiplier.powi(attempt as i32);
        let backoff = self.base_delay.mul_f64(factor).min(self.max_delay);
        match retry_after_ms.map(Duration::from_millis) {
            Some(hint) if hint > self.max_delay => None,
            Some(hint) => Some(backoff.max(hint)),
            None => Some(backoff),
        }
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
