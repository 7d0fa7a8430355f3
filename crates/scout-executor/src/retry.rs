//! Backoff schedule for `Transient` adapter failures.

use std::fmt;
use std::time::Duration;

/// Exponential backoff with a cap, applied only to `AdapterError::Transient`
/// failures (spec §7: "retried with backoff inside the Executor").
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f64,
    /// Upper bound on any single delay.
    pub cap_ms: u64,
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 250,
            factor: 2.0,
            cap_ms: 8_000,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// The delay to wait before attempt number `attempt` (0-indexed; 0 is
    /// the original call, so `delay_for(0)` is the wait before the first
    /// retry).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_ms as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis((scaled as u64).min(self.cap_ms))
    }

    /// Whether another attempt is allowed after `attempts_so_far` have run.
    #[must_use]
    pub fn should_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

/// Reported when a retried call never succeeded.
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    /// How many attempts were made.
    pub attempts: u32,
    /// The last failure's message.
    pub last_error: String,
}

impl fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_then_caps() {
        let policy = RetryPolicy {
            base_ms: 100,
            factor: 2.0,
            cap_ms: 350,
            max_attempts: 5,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
