use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

use crate::config::CircuitBreakerSpec;
use crate::error::{CapcatError, Result};
use crate::models::CircuitState;

struct Counters {
    state: CircuitState,
    consecutive_failures: u32,
    successes_in_half_open: u32,
    half_open_inflight: u32,
    last_failure_time: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            successes_in_half_open: 0,
            half_open_inflight: 0,
            last_failure_time: None,
            total_calls: 0,
            total_failures: 0,
            total_successes: 0,
        }
    }
}

/// Per-source circuit breaker state machine. One instance guards one
/// source's outbound calls. See invariant 6: the transition timing is
/// exact, not approximate.
pub struct CircuitBreaker {
    source_id: String,
    spec: CircuitBreakerSpec,
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
}

impl CircuitBreaker {
    pub fn new(source_id: impl Into<String>, spec: CircuitBreakerSpec) -> Self {
        Self {
            source_id: source_id.into(),
            spec,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Consult the breaker before attempting a call. Returns an error
    /// immediately if the circuit is open and the recovery timeout has
    /// not elapsed; otherwise admits the call (transitioning OPEN ->
    /// HALF_OPEN and bumping the half-open in-flight counter as needed).
    pub async fn admit(&self) -> Result<()> {
        let mut c = self.counters.lock().await;
        c.total_calls += 1;

        match c.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = c
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= Duration::from_secs_f64(self.spec.timeout_seconds) {
                    c.state = CircuitState::HalfOpen;
                    c.successes_in_half_open = 0;
                    c.half_open_inflight = 1;
                    Ok(())
                } else {
                    Err(CapcatError::CircuitOpen {
                        source_id: self.source_id.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if c.half_open_inflight < self.spec.half_open_max_calls {
                    c.half_open_inflight += 1;
                    Ok(())
                } else {
                    Err(CapcatError::CircuitOpen {
                        source_id: self.source_id.clone(),
                    })
                }
            }
        }
    }

    /// Report that an admitted call succeeded.
    pub async fn on_success(&self) {
        let mut c = self.counters.lock().await;
        c.total_successes += 1;
        match c.state {
            CircuitState::Closed => {
                c.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                c.successes_in_half_open += 1;
                c.half_open_inflight = c.half_open_inflight.saturating_sub(1);
                if c.successes_in_half_open >= self.spec.success_threshold {
                    c.state = CircuitState::Closed;
                    c.consecutive_failures = 0;
                    c.successes_in_half_open = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Report that an admitted call failed.
    pub async fn on_failure(&self) {
        let mut c = self.counters.lock().await;
        c.total_failures += 1;
        match c.state {
            CircuitState::Closed => {
                c.consecutive_failures += 1;
                if c.consecutive_failures >= self.spec.failure_threshold {
                    c.state = CircuitState::Open;
                    c.last_failure_time = Some(Instant::now());
                    warn!(source_id = %self.source_id, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                c.state = CircuitState::Open;
                c.last_failure_time = Some(Instant::now());
                c.consecutive_failures = self.spec.failure_threshold;
                c.half_open_inflight = 0;
                c.successes_in_half_open = 0;
            }
            CircuitState::Open => {
                c.last_failure_time = Some(Instant::now());
            }
        }
    }

    pub async fn stats(&self) -> CircuitStats {
        let c = self.counters.lock().await;
        CircuitStats {
            state: c.state,
            total_calls: c.total_calls,
            total_failures: c.total_failures,
            total_successes: c.total_successes,
        }
    }

    /// Run `f`, admitting through the breaker first and reporting the
    /// outcome back afterward. Mirrors the interaction order in the
    /// component design: admit, then call, then classify.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.admit().await?;
        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(e)
            }
        }
    }
}
