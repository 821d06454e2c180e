//! Token bucket guarding outbound Graph calls.
//!
//! The bucket refills lazily on every observation, so there is no background
//! task. `check_limit` never waits: an empty bucket is reported as
//! [`GraphError::RateLimit`] carrying the exact wait in milliseconds.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub max_requests_per_minute: u32,
    /// Bucket capacity. Defaults to `max_requests_per_minute`.
    pub burst_allowance: Option<u32>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            burst_allowance: None,
        }
    }
}

impl RateLimiterConfig {
    pub fn per_minute(max_requests_per_minute: u32) -> Self {
        Self {
            max_requests_per_minute,
            burst_allowance: None,
        }
    }

    pub fn with_burst(mut self, burst_allowance: u32) -> Self {
        self.burst_allowance = Some(burst_allowance);
        self
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst_allowance.unwrap_or(self.max_requests_per_minute))
    }

    fn refill_rate_per_ms(&self) -> f64 {
        f64::from(self.max_requests_per_minute) / 60_000.0
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill_ms: u64,
}

pub struct RateLimiter {
    capacity: f64,
    refill_rate_per_ms: f64,
    bucket: Mutex<Bucket>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("refill_rate_per_ms", &self.refill_rate_per_ms)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.capacity();
        let now = clock.now_ms();
        Self {
            capacity,
            refill_rate_per_ms: config.refill_rate_per_ms(),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill_ms: now,
            }),
            clock,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Consume one token, or fail with the time until one is available.
    pub fn check_limit(&self) -> Result<(), GraphError> {
        let mut bucket = self.lock();
        self.refill(&mut bucket);

        if bucket.tokens < 1.0 {
            let wait_ms = self.wait_ms(bucket.tokens);
            let wait_secs = wait_ms.div_ceil(1000);
            tracing::warn!(wait_ms, "Local rate limit reached");
            return Err(GraphError::RateLimit {
                message: format!(
                    "Rate limit exceeded. Please wait {} second{} before retrying.",
                    wait_secs,
                    if wait_secs == 1 { "" } else { "s" }
                ),
                retry_after_ms: wait_ms,
            });
        }

        bucket.tokens -= 1.0;
        Ok(())
    }

    /// Refill, then report. Never consumes.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }

    pub fn reset(&self) {
        let mut bucket = self.lock();
        bucket.tokens = self.capacity;
        bucket.last_refill_ms = self.clock.now_ms();
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(bucket.last_refill_ms) as f64;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate_per_ms).min(self.capacity);
        bucket.last_refill_ms = now;
    }

    fn wait_ms(&self, tokens: f64) -> u64 {
        if self.refill_rate_per_ms <= 0.0 {
            return u64::MAX;
        }
        ((1.0 - tokens) / self.refill_rate_per_ms).ceil() as u64
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // The bucket holds two plain numbers; a poisoned guard is still coherent.
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateLimiter::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn exhaustion_is_exact() {
        let (limiter, _clock) = limiter(RateLimiterConfig::per_minute(2).with_burst(2));
        assert!(limiter.check_limit().is_ok());
        assert!(limiter.check_limit().is_ok());
        let err = limiter.check_limit().unwrap_err();
        assert_eq!(err.kind_name(), "RateLimitError");
    }

    #[test]
    fn rejected_check_does_not_consume() {
        let (limiter, clock) = limiter(RateLimiterConfig::per_minute(60).with_burst(1));
        limiter.check_limit().unwrap();
        assert!(limiter.check_limit().is_err());
        assert!(limiter.check_limit().is_err());
        clock.advance(1000);
        assert!(limiter.check_limit().is_ok());
    }

    #[test]
    fn refills_one_token_per_second_at_sixty_per_minute() {
        let (limiter, clock) = limiter(RateLimiterConfig::per_minute(60));
        limiter.check_limit().unwrap();
        limiter.check_limit().unwrap();

        clock.advance(999);
        let tokens = limiter.available_tokens();
        assert!(tokens >= 58.0 && tokens < 59.0, "tokens = {}", tokens);

        clock.advance(1);
        let tokens = limiter.available_tokens();
        assert!((tokens - 59.0).abs() < 1e-9, "tokens = {}", tokens);
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let (limiter, clock) = limiter(RateLimiterConfig::per_minute(60).with_burst(5));
        limiter.check_limit().unwrap();
        clock.advance(24 * 60 * 60 * 1000);
        assert_eq!(limiter.available_tokens(), 5.0);
        for _ in 0..5 {
            limiter.check_limit().unwrap();
        }
        assert!(limiter.check_limit().is_err());
    }

    #[test]
    fn tokens_stay_within_bounds() {
        let (limiter, clock) = limiter(RateLimiterConfig::per_minute(120).with_burst(3));
        for step in 0..200u64 {
            let _ = limiter.check_limit();
            clock.advance((step * 37) % 700);
            let tokens = limiter.available_tokens();
            assert!((0.0..=3.0).contains(&tokens), "tokens = {}", tokens);
        }
    }

    #[test]
    fn wait_time_uses_fractional_deficit() {
        let (limiter, clock) = limiter(RateLimiterConfig::per_minute(60).with_burst(1));
        limiter.check_limit().unwrap();
        clock.advance(250);
        match limiter.check_limit() {
            Err(GraphError::RateLimit {
                retry_after_ms,
                message,
            }) => {
                assert!((750..=751).contains(&retry_after_ms), "{}", retry_after_ms);
                assert!(message.contains("1 second"), "{}", message);
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[test]
    fn reset_restores_capacity() {
        let (limiter, _clock) = limiter(RateLimiterConfig::per_minute(10));
        for _ in 0..10 {
            limiter.check_limit().unwrap();
        }
        assert!(limiter.available_tokens() < 1.0);
        limiter.reset();
        assert_eq!(limiter.available_tokens(), 10.0);
    }

    #[test]
    fn concurrent_checks_on_last_token_admit_exactly_one() {
        for _ in 0..50 {
            let clock = Arc::new(ManualClock::new());
            let limiter = Arc::new(RateLimiter::with_clock(
                RateLimiterConfig::per_minute(60).with_burst(1),
                clock,
            ));
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let limiter = limiter.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        limiter.check_limit().is_ok()
                    })
                })
                .collect();
            let admitted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(admitted, 1);
        }
    }
}
