use rand::Rng;
use std::time::Duration;

/// Marks which failures are worth retrying. Implemented by every outbound
/// error type.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff: `min(base · 2ⁿ · (1 + U(0, jitter)), max)` at
/// attempt `n` (0-indexed).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction in `[0, 0.5)`; spreads concurrent retries apart.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
        let jitter = if self.jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64((exp * jitter).min(self.max_delay.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
        };
        assert_eq!(policy.delay(9), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_in_band() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
        };
        for _ in 0..100 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(150));
        }
    }
}
