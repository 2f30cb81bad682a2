//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race an operation against a deadline
//! - Translate an elapsed deadline into `QueryError::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The losing future is dropped at the deadline, which cancels it
//! - Timeout errors are distinct from downstream errors

use std::future::Future;
use std::time::Duration;

use crate::error::{QueryError, QueryResult};

/// Run `fut` with a deadline, naming `operation` in the timeout error.
pub async fn with_timeout<T, Fut>(operation: &str, after: Duration, fut: Fut) -> QueryResult<T>
where
    Fut: Future<Output = QueryResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = %operation, timeout_ms = after.as_millis() as u64, "Operation timed out");
            Err(QueryError::timeout(operation, after))
        }
    }
}
