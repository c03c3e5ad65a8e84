use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CapcatError, Result};
use crate::models::SkipRecord;

/// Backoff schedule parameters for the retry executor.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// `base_delay * exponential_base^(attempt-1)`, capped at
    /// `max_delay`, multiplied by uniform jitter in `[0.5, 1.0)` when
    /// enabled. `attempt` is 1-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = (attempt.saturating_sub(1)) as i32;
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let scaled = if self.jitter {
            let factor = 0.5 + rand::thread_rng().gen::<f64>() * 0.5;
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// The outcome of one `RetryExecutor::execute` call, replacing the
/// exception-based control flow (Skip sentinels, CircuitBreakerOpenError)
/// the original source used for the same purpose.
pub enum Outcome<T> {
    Success(T),
    Skipped(SkipRecord),
}

/// Accumulates `SkipRecord`s across a run. Owned by the `Runtime`, not a
/// process-global singleton, so two concurrent runs never share state.
#[derive(Default)]
pub struct SkipTracker {
    records: Mutex<Vec<SkipRecord>>,
}

impl SkipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: SkipRecord) {
        self.records.lock().await.push(record);
    }

    pub async fn drain(&self) -> Vec<SkipRecord> {
        std::mem::take(&mut *self.records.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

/// Bounded retry of a fallible async operation, with exponential
/// backoff + jitter, classifying errors via `CapcatError::is_retryable`
/// and recording a `SkipRecord` when attempts are exhausted.
pub struct RetryExecutor {
    backoff: BackoffConfig,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryExecutor {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self { backoff }
    }

    /// Run `operation` up to `max_attempts` times. Non-retryable errors
    /// propagate on their first occurrence. Retryable errors are retried
    /// with backoff; if the last attempt still fails, returns
    /// `Outcome::Skipped` with a populated `SkipRecord` rather than the
    /// error itself.
    pub async fn execute<F, Fut, T>(
        &self,
        source_id: &str,
        operation_name: &str,
        max_attempts: u32,
        mut operation: F,
    ) -> Result<Outcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            source_id, operation_name, attempt, "operation recovered after retry"
                        );
                    }
                    return Ok(Outcome::Success(value));
                }
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    let is_last_attempt = attempt >= max_attempts;
                    warn!(
                        source_id,
                        operation_name, attempt, max_attempts, error = %e, "retryable error"
                    );

                    if is_last_attempt {
                        let record = SkipRecord {
                            source_id: source_id.to_string(),
                            operation: operation_name.to_string(),
                            reason: e.to_string(),
                            attempts: attempt,
                            error_kind: e.kind().to_string(),
                            timestamp: Utc::now(),
                        };
                        return Ok(Outcome::Skipped(record));
                    }

                    let delay = self.backoff.delay_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Tries each URL in `urls` in order via the retry executor, returning
/// the first successful result. Returns the last skip record if every
/// URL in the chain is exhausted.
pub struct UrlFallbackExecutor {
    executor: RetryExecutor,
}

impl Default for UrlFallbackExecutor {
    fn default() -> Self {
        Self {
            executor: RetryExecutor::default(),
        }
    }
}

impl UrlFallbackExecutor {
    pub fn new(executor: RetryExecutor) -> Self {
        Self { executor }
    }

    pub async fn execute_with_fallbacks<F, Fut, T>(
        &self,
        source_id: &str,
        operation_name: &str,
        urls: &[String],
        max_retries_per_url: u32,
        mut fetch: F,
    ) -> Outcome<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_skip = None;
        for url in urls {
            let url = url.clone();
            let result = self
                .executor
                .execute(source_id, operation_name, max_retries_per_url, || {
                    fetch(url.clone())
                })
                .await;

            match result {
                Ok(Outcome::Success(value)) => return Outcome::Success(value),
                Ok(Outcome::Skipped(record)) => last_skip = Some(record),
                Err(_) => continue,
            }
        }

        Outcome::Skipped(last_skip.unwrap_or_else(|| SkipRecord {
            source_id: source_id.to_string(),
            operation: operation_name.to_string(),
            reason: "all URLs in fallback chain exhausted".to_string(),
            attempts: 0,
            error_kind: "article_discovery_failed".to_string(),
            timestamp: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn network_err() -> CapcatError {
        CapcatError::Timeout {
            url: "https://example.com".into(),
            elapsed: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_try_without_retry() {
        let executor = RetryExecutor::new(BackoffConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
            jitter: false,
        });
        let outcome = executor
            .execute("ex", "fetch", 3, || async { Ok::<_, CapcatError>(42) })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Success(42)));
    }

    #[tokio::test]
    async fn retries_exactly_max_attempts_then_skips() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(BackoffConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
            jitter: false,
        });
        let calls_clone = calls.clone();
        let outcome = executor
            .execute("ex", "fetch", 2, move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(network_err()) }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(outcome, Outcome::Skipped(_)));
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();
        let calls_clone = calls.clone();
        let result = executor
            .execute("ex", "fetch", 5, move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(CapcatError::Validation {
                        field: "x".into(),
                        requirement: "y".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let cfg = BackoffConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: false,
        };
        assert_eq!(cfg.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn url_fallback_returns_first_success() {
        let fallback = UrlFallbackExecutor::default();
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let outcome = fallback
            .execute_with_fallbacks("ex", "discover", &urls, 1, |url| async move {
                if url.contains("b.example") {
                    Ok(url)
                } else {
                    Err(network_err())
                }
            })
            .await;
        match outcome {
            Outcome::Success(url) => assert!(url.contains("b.example")),
            Outcome::Skipped(_) => panic!("expected success from fallback"),
        }
    }
}
