//! Bounded exponential backoff for continuous-listening reconnects.

use std::time::Duration;

/// Backoff policy for re-issuing the listening GET after connection loss.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Give up after this many attempts; `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// The delay before retry number `attempt` (zero-based), or `None` once
    /// the retry budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_retries {
            if attempt >= max {
                return None;
            }
        }
        let factor = self.multiplier.powi(attempt.min(63) as i32);
        let delay = self.base_delay.mul_f64(factor.max(1.0));
        Some(delay.min(self.max_delay))
    }
}
