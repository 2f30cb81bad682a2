//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failed query is worth retrying
//! - Execute retries with exponential backoff + jitter
//!
//! # Design Decisions
//! - Never retry a circuit-open rejection (the breaker already decided)
//! - Only transient categories (network, timeout, database, rate limit) retry
//! - Jittered backoff prevents thundering herd
//! - Callers opt in explicitly; breakers and caches never retry on their own

use std::future::Future;

use crate::config::RetryConfig;
use crate::error::{QueryError, QueryResult};
use crate::resilience::backoff::calculate_backoff;

/// Whether `error` may succeed on a later attempt.
pub fn is_retryable(error: &QueryError) -> bool {
    if error.is_circuit_open() {
        return false;
    }
    error.category().is_transient()
}

/// Run `f` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` is exhausted. The last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, operation: &str, mut f: F) -> QueryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    let max_attempts = if config.enabled { config.max_attempts.max(1) } else { 1 };
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                tracing::info!(
                    operation = %operation,
                    attempt,
                    delay = ?delay,
                    error = %e,
                    "Retrying query"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
