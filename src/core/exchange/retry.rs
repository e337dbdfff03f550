//! Retry policy for upstream requests.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a delay cap and uniform jitter.
///
/// The delay before retry `n` (zero-based) is
/// `min(base * 2^n, max_delay)` scaled by a uniform factor in
/// `[0.75, 1.25]`. Only transport errors, 429s, and 5xx responses are
/// retried; other client errors fail fast.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (zero-based), jitter applied.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        exp.mul_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_within_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };

        // Jitter is +/- 25%, so bound checks use the extremes.
        let d0 = policy.delay_for(0);
        assert!(d0 >= Duration::from_millis(75) && d0 <= Duration::from_millis(125));

        let d2 = policy.delay_for(2);
        assert!(d2 >= Duration::from_millis(300) && d2 <= Duration::from_millis(500));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
        };
        for attempt in 4..10 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        let d = policy.delay_for(40);
        assert!(d <= policy.max_delay.mul_f64(1.25));
    }
}
