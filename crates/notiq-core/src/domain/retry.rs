//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the random jitter, as a fraction of the capped delay.
pub const MAX_JITTER_RATIO: f64 = 0.1;

/// Capped exponential backoff with up to 10% jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Cap applied before jitter.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// `min(base_delay * 2^(attempts - 1), max_delay)`, whole milliseconds.
    ///
    /// `attempts` is 1-indexed; 0 is treated as 1.
    pub fn capped_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.max(1) - 1;
        let base_ms = self.base_delay.as_millis();
        let max_ms = self.max_delay.as_millis();
        let delay_ms = 1u128
            .checked_shl(exponent)
            .map_or(u128::MAX, |factor| base_ms.saturating_mul(factor))
            .min(max_ms);
        Duration::from_millis(u64::try_from(delay_ms).unwrap_or(u64::MAX))
    }

    /// Capped delay scaled by `1 + jitter`, truncated to whole milliseconds.
    ///
    /// `jitter` is clamped into `[0, MAX_JITTER_RATIO]`.
    pub fn backoff_with_jitter(&self, attempts: u32, jitter: f64) -> Duration {
        let jitter = jitter.clamp(0.0, MAX_JITTER_RATIO);
        let capped_ms = self.capped_delay(attempts).as_millis() as f64;
        Duration::from_millis((capped_ms * (1.0 + jitter)).trunc() as u64)
    }

    /// Backoff drawing jitter from `rng`.
    pub fn backoff<R: Rng + ?Sized>(&self, attempts: u32, rng: &mut R) -> Duration {
        let jitter = rng.gen_range(0.0..=MAX_JITTER_RATIO);
        self.backoff_with_jitter(attempts, jitter)
    }

    /// Backoff using the thread-local RNG.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        self.backoff(attempts, &mut rand::thread_rng())
    }
}
