use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::models::RateLimitSpec;

/// Per-source token bucket. `tokens` replenish continuously at
/// `refill_rate` per second up to `capacity`; `acquire` consumes one
/// token, sleeping first if none is available.
struct RateBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_rate: f64,
    min_delay: Duration,
}

impl RateBucket {
    fn new(spec: RateLimitSpec) -> Self {
        Self {
            tokens: spec.burst as f64,
            last_refill: Instant::now(),
            capacity: spec.burst as f64,
            refill_rate: spec.requests_per_second,
            min_delay: Duration::from_secs_f64(spec.min_delay_seconds),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Thread-safe per-source rate limiter. One instance guards one
/// source's outbound requests; waits here never serialize across
/// sources since each source owns its own bucket.
pub struct RateLimiter {
    bucket: Mutex<RateBucket>,
}

impl RateLimiter {
    pub fn new(spec: RateLimitSpec) -> Self {
        Self {
            bucket: Mutex::new(RateBucket::new(spec)),
        }
    }

    /// Consume one token, waiting if necessary. The lock is dropped
    /// during the sleep so other callers on a *different* source are
    /// never blocked by this one (each source has its own `RateLimiter`
    /// so this matters only for re-entrancy correctness, not cross-source
    /// contention).
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    let computed = Duration::from_secs_f64(deficit / bucket.refill_rate);
                    Some(computed.max(bucket.min_delay))
                }
            };

            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }

    /// Non-blocking variant: returns `true` if a token was available and
    /// consumed, `false` otherwise, never sleeping.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_capacity_allows_immediate_acquires() {
        let limiter = RateLimiter::new(RateLimitSpec {
            requests_per_second: 1.0,
            burst: 3,
            min_delay_seconds: 0.0,
        });
        for _ in 0..3 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn acquire_blocks_until_refill() {
        let limiter = RateLimiter::new(RateLimitSpec {
            requests_per_second: 20.0,
            burst: 1,
            min_delay_seconds: 0.0,
        });
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn min_delay_is_enforced_even_with_tokens() {
        let limiter = RateLimiter::new(RateLimitSpec {
            requests_per_second: 100.0,
            burst: 1,
            min_delay_seconds: 0.05,
        });
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
