use std::time::Duration;

use pressroom_core::config::PublishConfig;
use rand::Rng;

/// Jitter fraction applied to each computed delay (up to +10 %).
const JITTER_FRACTION: f64 = 0.10;

/// Bounded exponential backoff shared by every target of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retry-After hints above this are not waited on.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PublishConfig::default())
    }
}

impl From<&PublishConfig> for RetryPolicy {
    fn from(cfg: &PublishConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            max_rate_limit_wait: Duration::from_secs(cfg.max_rate_limit_wait_secs),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt-1)` capped at `max_delay`, before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Wait before the attempt following `attempt` (1-based).
    ///
    /// A Retry-After hint is a floor. Returns `None` when the hint exceeds
    /// `max_rate_limit_wait`: the caller should give up rather than sleep.
    pub fn delay_after(&self, attempt: u32, hint: Option<Duration>) -> Option<Duration> {
        if hint.is_some_and(|h| h > self.max_rate_limit_wait) {
            return None;
        }
        let computed = with_jitter(self.backoff(attempt));
        Some(hint.map_or(computed, |h| h.max(computed)))
    }

    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let max_jitter_ms = (delay.as_millis() as f64 * JITTER_FRACTION) as u64;
    if max_jitter_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
}
