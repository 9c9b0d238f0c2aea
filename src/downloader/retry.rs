//! Exponential backoff with jitter for transient chunk fetch failures.

use std::time::Duration;

use rand::Rng;

use crate::config::ChunkConfig;

/// Largest doubling applied to the base delay.
const MAX_SHIFT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ChunkConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    /// Ceiling of the `retry`-th (0-based) delay: `base * 2^retry`, capped at `max_delay`.
    pub fn ceiling(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << retry.min(MAX_SHIFT))
            .min(self.max_delay)
    }

    /// The actual sleep before retry `retry`: uniformly drawn from `[ceiling/2, ceiling]`
    /// so that chunks failing together do not retry in lockstep.
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry).as_millis() as u64;
        if ceiling < 2 {
            return Duration::from_millis(ceiling);
        }
        Duration::from_millis(rand::rng().random_range(ceiling / 2..=ceiling))
    }
}
