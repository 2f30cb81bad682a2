//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Query to backend:
//!     → circuit_breaker.rs (fail fast while the dependency is unhealthy)
//!     → timeouts.rs (every call has a deadline)
//!     → On failure, if the caller opted in: retries.rs (retry transient errors with backoff)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Circuit breaker prevents hammering an unhealthy backend
//! - Errors from the wrapped operation are forwarded, never swallowed

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use retries::{is_retryable, retry_with_backoff};
pub use timeouts::with_timeout;
