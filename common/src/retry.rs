// Retry strategy for delivery attempts: exponential backoff with jitter.
// Delays stay short because every retry has to land inside the firing window.

use rand::Rng;
use std::time::Duration;

/// Default number of retries after the first delivery attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Decides how long a transport waits before resending a failed payload
pub trait RetryStrategy: Send + Sync {
    /// Wait before retry number `attempt` (0-based), or None once the budget is spent
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    fn max_retries(&self) -> u32;

    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries()
    }
}

/// Tripling backoff with additive jitter: 500ms, 1.5s, 4.5s, then 10s
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
    max_retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_factor: 0.1,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter_factor: f64,
        max_retries: u32,
    ) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_retries,
        }
    }

    /// Same timings with a different retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// base * 3^attempt, capped at max_delay
    fn base_delay_for(&self, attempt: u32) -> u64 {
        let factor = 3_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    fn add_jitter_ms(&self, base_delay_ms: u64) -> u64 {
        let spread = (base_delay_ms as f64 * self.jitter_factor) as u64;
        if spread == 0 {
            return base_delay_ms;
        }
        base_delay_ms + rand::thread_rng().gen_range(0..=spread)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let delay_ms = self.add_jitter_ms(self.base_delay_for(attempt));
        Some(Duration::from_millis(delay_ms))
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Constant wait between attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(self.delay)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
