use std::time::Duration;

use crate::config::ReconnectSettings;

/// Deterministic exponential backoff: `min(base * 2^(attempt-1), max)`, with
/// no jitter, for at most `max_attempts` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt`, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let millis = self
            .base
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.max.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// `None` once `attempt` is past the retry budget.
    pub fn next(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            None
        } else {
            Some(self.delay(attempt))
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}
