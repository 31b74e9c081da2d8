use rand::Rng;
use std::time::Duration;

use crate::domain::models::MAX_ATTEMPTS;

/// Share of the delay that jitter may add or remove.
const JITTER_FRACTION: f64 = 0.2;

/// Backoff schedule for one delivery cycle.
///
/// Attempt `n > 1` waits `base_delay * 2^(n-2)` before being sent, giving
/// 1s, 2s, 4s with the default base. Jitter is off by default so the
/// schedule is deterministic.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_attempts: u32,

    base_delay_ms: u64,

    jitter: bool,
}

impl RetryStrategy {
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

    pub fn new(base_delay_ms: u64) -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms,
            jitter: false,
        }
    }

    /// Spread retries by up to ±20% of the computed delay.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    /// Deterministic delay to sleep before `attempt` (1-based).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let multiplier = 2_u64.saturating_pow(attempt - 2);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier))
    }

    /// Delay actually slept before `attempt`, with jitter applied if enabled.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let delay = self.backoff_before(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let delay_ms = delay.as_millis() as u64;
        let spread = (delay_ms as f64 * JITTER_FRACTION) as u64;
        let mut rng = rand::rng();
        let offset = rng.random_range(0..=spread);

        if rng.random_bool(0.5) {
            Duration::from_millis(delay_ms.saturating_add(offset))
        } else {
            Duration::from_millis(delay_ms.saturating_sub(offset))
        }
    }

    /// Whether another attempt may follow `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_DELAY_MS)
    }
}
