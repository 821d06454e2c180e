//! Resilience primitives wrapped around every outbound Graph call.
//!
//! # Data Flow
//! ```text
//! GraphClient verb
//!     → rate_limiter.rs   (admit or reject, never waits)
//!     → circuit_breaker.rs (fail fast while the upstream is unhealthy)
//!     → retry.rs          (exponential backoff + jitter for transient failures)
//!     → HTTP transport
//! ```
//!
//! Limiter and breaker state sit behind a mutex, so each check-and-mutate is
//! atomic with respect to concurrent callers. Neither lock is held across an
//! `.await`.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::RetryPolicy;
