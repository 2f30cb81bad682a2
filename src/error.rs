//! Error types for the query layer.
//!
//! # Taxonomy
//! - `Timeout`: the deadline raced by `resilience::timeouts` fired first
//! - `CircuitOpen`: a breaker refused to dispatch
//! - `Upstream` / `Message`: whatever the wrapped fetch produced, forwarded verbatim
//! - `Serialization`: a value did not round-trip through JSON
//!
//! `QueryError` is `Clone` because a deduplicated request hands the same
//! outcome to every waiting caller.

use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by breakers, deduplicators, caches and the manager.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The operation did not settle before its deadline.
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// The named circuit breaker is open and failing fast.
    #[error("circuit breaker '{name}' is OPEN, request rejected")]
    CircuitOpen { name: String },

    /// Error produced by the downstream fetch.
    #[error("{0}")]
    Upstream(Arc<dyn std::error::Error + Send + Sync>),

    /// Downstream failure described only by a message.
    #[error("{0}")]
    Message(String),

    /// Value could not be encoded to or decoded from JSON.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl QueryError {
    /// Wrap an arbitrary downstream error.
    pub fn upstream<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::Upstream(Arc::new(err))
    }

    /// Downstream failure from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        QueryError::Message(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        QueryError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, QueryError::CircuitOpen { .. })
    }

    /// Category used for user-facing messaging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryError::Timeout { .. } => ErrorCategory::Timeout,
            QueryError::CircuitOpen { .. } => ErrorCategory::Network,
            other => classify(&other.to_string()),
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}

/// Result type for query layer operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Coarse error categories derived from error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Database,
    Validation,
    Auth,
    Permission,
    NotFound,
    RateLimit,
    Unknown,
}

impl ErrorCategory {
    /// Canned message shown to end users for this category.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Network => {
                "Unable to connect to the server. Please check your internet connection and try again."
            }
            ErrorCategory::Timeout => "The request took too long to complete. Please try again.",
            ErrorCategory::Database => {
                "There was a problem accessing the data. Please try again in a moment."
            }
            ErrorCategory::Validation => "Some of the information provided is invalid. Please review and try again.",
            ErrorCategory::Auth => "Your session has expired. Please sign in again.",
            ErrorCategory::Permission => "You do not have permission to perform this action.",
            ErrorCategory::NotFound => "The requested information could not be found.",
            ErrorCategory::RateLimit => "Too many requests. Please wait a moment and try again.",
            ErrorCategory::Unknown => "An unexpected error occurred. Please try again.",
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Database
                | ErrorCategory::RateLimit
        )
    }
}

// Checked in order; the first match wins.
static PATTERNS: LazyLock<Vec<(ErrorCategory, Regex)>> = LazyLock::new(|| {
    [
        (ErrorCategory::Timeout, r"(?i)timed? ?out|deadline"),
        (ErrorCategory::RateLimit, r"(?i)rate limit|too many requests|\b429\b"),
        (ErrorCategory::Auth, r"(?i)unauthori[sz]ed|jwt|token (expired|invalid)|not authenticated|\b401\b"),
        (ErrorCategory::Permission, r"(?i)forbidden|permission denied|not allowed|row.level security|\b403\b"),
        (ErrorCategory::NotFound, r"(?i)not found|does not exist|no rows|\b404\b"),
        (ErrorCategory::Validation, r"(?i)invalid|validation|required|constraint|violates"),
        (ErrorCategory::Network, r"(?i)network|fetch failed|connection|econnrefused|offline|circuit breaker"),
        (ErrorCategory::Database, r"(?i)database|postgres|sql|relation|query failed|supabase"),
    ]
    .into_iter()
    .filter_map(|(category, pattern)| Regex::new(pattern).ok().map(|re| (category, re)))
    .collect()
});

/// Classify an error message into an [`ErrorCategory`].
pub fn classify(message: &str) -> ErrorCategory {
    PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::timeout("Database", Duration::from_millis(250));
        assert_eq!(err.to_string(), "Database timed out after 250ms");

        let err = QueryError::CircuitOpen {
            name: "COODashboard".into(),
        };
        assert!(err.to_string().contains("COODashboard"));
        assert!(err.is_circuit_open());
    }

    #[test]
    fn test_upstream_is_verbatim() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "relation \"teams\" does not exist");
        let err = QueryError::upstream(io);
        assert_eq!(err.to_string(), "relation \"teams\" does not exist");
    }

    #[test]
    fn test_classify_messages() {
        assert_eq!(classify("Failed to fetch: network error"), ErrorCategory::Network);
        assert_eq!(classify("JWT expired"), ErrorCategory::Auth);
        assert_eq!(classify("permission denied for table teams"), ErrorCategory::Permission);
        assert_eq!(classify("duplicate key value violates unique constraint"), ErrorCategory::Validation);
        assert_eq!(classify("Too Many Requests"), ErrorCategory::RateLimit);
        assert_eq!(classify("something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_category_from_variant() {
        let err = QueryError::timeout("op", Duration::from_secs(1));
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(err.category().is_transient());

        let err = QueryError::message("Record not found");
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(!err.category().is_transient());
        assert!(!err.category().user_message().is_empty());
    }
}
