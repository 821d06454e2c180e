//! Exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Upper bound of the random jitter, as a fraction of the base delay.
const JITTER_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// `base_delay_ms * 2^attempt` plus 0-30% jitter. `attempt` is 0-based.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let jitter_range = (exponential as f64 * JITTER_RATIO) as u64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..=jitter_range)
        } else {
            0
        };
        Duration::from_millis(exponential.saturating_add(jitter))
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or the retry budget is spent. The last error is surfaced.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, GraphError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient Graph failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy::new(3, 1_000);
        for attempt in 0..4 {
            let base = 1_000u64 * 2u64.pow(attempt);
            for _ in 0..20 {
                let ms = policy.delay_for_attempt(attempt).as_millis() as u64;
                assert!(ms >= base, "attempt {} delay {}", attempt, ms);
                assert!(ms <= base + base * 3 / 10, "attempt {} delay {}", attempt, ms);
            }
        }
    }

    #[test]
    fn zero_base_delay_means_no_wait() {
        let policy = RetryPolicy::new(3, 0);
        assert_eq!(policy.delay_for_attempt(2), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy::new(3, 1_000);
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GraphError::transient("service temporarily unavailable", Some(503)))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, 1_000);
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GraphError::authentication("expired"))
            })
            .await;
        assert_eq!(result.unwrap_err().kind_name(), "AuthenticationError");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_a_later_attempt_succeeds() {
        let policy = RetryPolicy::new(3, 10);
        let result = policy
            .run(|attempt| async move {
                if attempt < 2 {
                    Err(GraphError::transient("network error", None))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }
}
