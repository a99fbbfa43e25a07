//! Token bucket guarding the quota-limited recognition service.

use platewatch_core::SolverConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Allows at most `limit` acquisitions per `interval`, measured from the last refill.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    interval: Duration,
    safety_margin: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a full bucket. A zero limit is treated as one.
    #[must_use]
    pub fn new(limit: u32, interval: Duration, safety_margin: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            interval,
            safety_margin,
            bucket: Mutex::new(Bucket {
                tokens: limit,
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(
            config.requests_per_interval,
            Duration::from_millis(config.interval_ms),
            Duration::from_millis(config.safety_margin_ms),
        )
    }

    /// Take one token, sleeping past the next refill boundary if the bucket is empty.
    pub async fn acquire(&self) {
        // Holding the lock while sleeping queues other callers behind the refill
        let mut bucket = self.bucket.lock().await;

        let elapsed = bucket.last_refill.elapsed();
        if elapsed >= self.interval {
            bucket.tokens = self.limit;
            bucket.last_refill = Instant::now();
        }

        if bucket.tokens == 0 {
            let wait = self.interval.saturating_sub(elapsed) + self.safety_margin;
            info!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                limit = self.limit,
                "recognition rate limit reached, waiting for refill"
            );
            tokio::time::sleep(wait).await;
            bucket.tokens = self.limit;
            bucket.last_refill = Instant::now();
        }

        bucket.tokens -= 1;
    }

    /// Tokens left in the current window.
    pub async fn available(&self) -> u32 {
        self.bucket.lock().await.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_limit_does_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_until_refill_plus_margin() {
        let limiter = RateLimiter::new(2, Duration::from_millis(1000), Duration::from_millis(100));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert_eq!(start.elapsed(), Duration::from_millis(1100));
        assert_eq!(limiter.available().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_after_interval_without_waiting() {
        let limiter = RateLimiter::new(1, Duration::from_millis(500), Duration::from_millis(100));
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(600)).await;
        let before = Instant::now();
        limiter.acquire().await;

        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_accounts_for_elapsed_time() {
        let limiter = RateLimiter::new(1, Duration::from_millis(1000), Duration::from_millis(50));
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(700)).await;
        let before = Instant::now();
        limiter.acquire().await;

        assert_eq!(before.elapsed(), Duration::from_millis(350));
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1), Duration::ZERO);
        assert_eq!(limiter.limit, 1);
    }
}
