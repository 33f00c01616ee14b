//! Exponential backoff with jitter, shared by REST retry and
//! session reconnect.

use rand::Rng;
use std::time::Duration;

/// Base-doubling backoff, capped, with jitter to spread thundering
/// herds of reconnects across many symbols and venues.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffConfig {
    pub fn new(base: Duration, max: Duration) -> Self {
        BackoffConfig { base, max }
    }

    /// Delay before the given retry attempt (0-based), jittered into
    /// the range [0.75, 1.0] of the capped exponential value.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let capped = self.base.saturating_mul(factor).min(self.max);
        let jitter = rand::thread_rng().gen_range(0.75..=1.0);
        capped.mul_f64(jitter)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            base: Duration::from_millis(250),
            max: Duration::from_secs(30),
        }
    }
}
