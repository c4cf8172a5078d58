use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Marker returned when a call is rejected without being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker. Closed → Open at
/// `failure_threshold`; Open → HalfOpen after `cool_down`; HalfOpen closes
/// on one success and reopens on one failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cool_down: Duration,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cool_down,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed. Flips Open → HalfOpen once the cool-down
    /// has elapsed.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.cool_down)
                    .unwrap_or(true);
                if elapsed {
                    tracing::info!("circuit breaker half-open");
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::HalfOpen {
            tracing::info!("circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                tracing::warn!("circuit breaker reopened");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }
}
