//! Three-state failure guard for the Graph upstream.
//!
//! # State Transitions
//! ```text
//! Closed    → Open:      consecutive_failures reaches failure_threshold
//! Open      → Half-Open: first execute() after timeout_ms has elapsed
//! Half-Open → Closed:    consecutive_successes reaches success_threshold
//! Half-Open → Open:      any failure
//! ```
//!
//! [`CircuitBreaker::state`] reports the *logical* state: once the open
//! timeout has elapsed it answers `HalfOpen` even though the stored tag only
//! flips on the next `execute()`. Pollers therefore see recovery eligibility
//! before any trial call has been made.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_until_ms: u64,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_until_ms: 0,
            }),
            clock,
        }
    }

    /// Run `operation` under the breaker. While open and inside the timeout
    /// the operation is not invoked at all.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, GraphError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        self.admit()?;
        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        if inner.state == CircuitState::Open && self.clock.now_ms() >= inner.opened_until_ms {
            CircuitState::HalfOpen
        } else {
            inner.state
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.lock().consecutive_successes
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_until_ms = 0;
    }

    fn admit(&self) -> Result<(), GraphError> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let now = self.clock.now_ms();
        if now < inner.opened_until_ms {
            let remaining_secs = (inner.opened_until_ms - now).div_ceil(1000);
            return Err(GraphError::transient(
                format!(
                    "Microsoft Graph is unavailable: circuit breaker is open. Retry in {}s.",
                    remaining_secs
                ),
                None,
            ));
        }

        info!("Circuit breaker half-open, allowing trial request");
        inner.state = CircuitState::HalfOpen;
        inner.consecutive_successes = 0;
        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    info!("Circuit breaker closed after successful trial requests");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                }
            }
            // A concurrent trial already re-opened the circuit.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        let now = self.clock.now_ms();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        timeout_ms = self.config.timeout_ms,
                        "Circuit breaker opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_until_ms = now.saturating_add(self.config.timeout_ms);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Trial request failed, circuit breaker re-opened");
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                inner.opened_until_ms = now.saturating_add(self.config.timeout_ms);
            }
            CircuitState::Open => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
