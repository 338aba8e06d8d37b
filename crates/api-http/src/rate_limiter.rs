//! Upload Rate Limiter (Token Bucket)
//!
//! Uploads are the expensive endpoint: each one stores a file and
//! registers a job. The bucket holds `burst` tokens and refills at
//! `per_second`.

use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum burst size
    pub burst: u32,
    /// Tokens added per second
    pub per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 20,
            per_second: 5,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    max_tokens: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_tokens = f64::from(config.burst.max(1));
        Self {
            bucket: Mutex::new(Bucket {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
            max_tokens,
            refill_per_sec: f64::from(config.per_second),
        }
    }

    /// Consume one token. On refusal, returns how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        if self.refill_per_sec <= 0.0 {
            return Err(Duration::from_secs(60));
        }
        let missing = 1.0 - bucket.tokens;
        Err(Duration::from_secs_f64(missing / self.refill_per_sec))
    }

    /// Tokens currently available (for monitoring)
    pub fn remaining(&self) -> u32 {
        match self.bucket.lock() {
            Ok(bucket) => bucket.tokens as u32,
            Err(poisoned) => poisoned.into_inner().tokens as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(burst: u32, per_second: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig { burst, per_second })
    }

    #[test]
    fn test_allows_burst_then_refuses() {
        let limiter = limiter(10, 1);

        for _ in 0..10 {
            assert!(limiter.try_acquire().is_ok());
        }

        assert_eq!(limiter.remaining(), 0);
        let wait = limiter.try_acquire().unwrap_err();
        assert!(wait <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_refills_over_time() {
        let limiter = limiter(2, 20);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_the_burst() {
        let limiter = Arc::new(limiter(100, 1));

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.try_acquire().is_ok()).count()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            allowed += handle.await.unwrap();
        }

        assert!(allowed >= 100, "expected the full burst, got {}", allowed);
        assert!(allowed <= 102, "expected at most the burst plus refill, got {}", allowed);
    }
}
