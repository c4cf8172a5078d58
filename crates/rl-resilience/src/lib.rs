//! Retry, circuit breaking and error classification for every outbound
//! dependency. Breakers are process-local; each dependency gets its own.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker, CircuitOpen};
pub use retry::{Retryable, RetryPolicy};

use std::future::Future;

/// Run `op` under `policy`, gated by `breaker`. Each attempt checks the
/// breaker first; transient failures back off and retry, permanent failures
/// return immediately. The breaker counts transient failures only.
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + From<CircuitOpen> + std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        if !breaker.try_acquire() {
            return Err(CircuitOpen.into());
        }
        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err) if err.is_transient() => {
                breaker.record_failure();
                if attempt + 1 >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("permanent")]
        Permanent,
        #[error("circuit open")]
        Open,
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    impl From<CircuitOpen> for TestError {
        fn from(_: CircuitOpen) -> Self {
            Self::Open
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::default();
        let result: Result<u32, TestError> = execute(&fast_policy(5), &breaker, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError::Transient)
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::default();
        let result: Result<(), TestError> = execute(&fast_policy(5), &breaker, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Permanent)
        })
        .await;
        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::default();
        let result: Result<(), TestError> = execute(&fast_policy(3), &breaker, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Transient)
        })
        .await;
        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::new(1, std::time::Duration::from_secs(60));
        breaker.record_failure();
        let result: Result<(), TestError> = execute(&fast_policy(3), &breaker, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Transient)
        })
        .await;
        assert!(matches!(result, Err(TestError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
