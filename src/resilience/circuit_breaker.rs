//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since last failure
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One breaker per logical dependency, owned by `QueryContext`
//! - Fail fast in Open state (the wrapped operation is never invoked)
//! - Every call runs under the configured timeout; a timeout is a failure
//! - Errors are returned to the caller unchanged; no retries in here
//! - State lives behind a mutex that is never held across an await

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::{QueryError, QueryResult};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    /// Epoch milliseconds of the last failure.
    pub last_failure_time: Option<u64>,
    /// Epoch milliseconds of the last success.
    pub last_success_time: Option<u64>,
    /// Milliseconds since the breaker last entered Closed; 0 while not Closed.
    pub uptime_ms: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<u64>,
    last_success_time: Option<u64>,
    closed_since: Option<Instant>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            last_failure_at: None,
            last_failure_time: None,
            last_success_time: None,
            closed_since: Some(Instant::now()),
        }
    }
}

/// A named circuit breaker guarding one downstream dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `f` through the breaker.
    ///
    /// Rejects with [`QueryError::CircuitOpen`] without calling `f` while the
    /// circuit is open and the recovery timeout has not elapsed.
    pub async fn execute<T, F, Fut>(&self, f: F) -> QueryResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        self.admit()?;

        let result = with_timeout(&self.name, self.config.timeout(), f()).await;
        match &result {
            Ok(_) => self.on_success(),
            Err(e) => self.on_failure(e),
        }
        result
    }

    /// Current state without side effects.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            uptime_ms: inner
                .closed_since
                .map(|since| since.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    /// Force the breaker closed and zero its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = BreakerInner::new();
        drop(inner);
        metrics::record_breaker_state(&self.name, CircuitState::Closed);
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> QueryResult<()> {
        let mut inner = self.lock();
        inner.total_requests += 1;

        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let recovering = inner
            .last_failure_at
            .map(|at| at.elapsed() >= self.config.recovery_timeout())
            .unwrap_or(true);

        if !recovering {
            drop(inner);
            metrics::record_breaker_rejection(&self.name);
            tracing::debug!(breaker = %self.name, "Circuit open, rejecting request");
            return Err(QueryError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        inner.success_count = 0;
        self.transition(&mut inner, CircuitState::HalfOpen);
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.success_count += 1;
        inner.last_success_time = Some(epoch_millis());

        if inner.state == CircuitState::HalfOpen && inner.success_count >= self.config.success_threshold {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    fn on_failure(&self, error: &QueryError) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure_time = Some(epoch_millis());

        tracing::debug!(
            breaker = %self.name,
            failures = inner.failure_count,
            error = %error,
            "Call through circuit breaker failed"
        );

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.closed_since = (to == CircuitState::Closed).then(Instant::now);

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                failures = inner.failure_count,
                recovery_timeout_ms = self.config.recovery_timeout_ms,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state change"),
        }
        metrics::record_breaker_state(&self.name, to);
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout_ms: 1_000,
            success_threshold: 1,
            timeout_ms: 500,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> QueryError {
        breaker
            .execute(|| async { Err::<(), _>(QueryError::message("connection refused")) })
            .await
            .unwrap_err()
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("Database", config());

        for _ in 0..2 {
            fail(&breaker).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_healthy());

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = breaker
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert!(err.to_string().contains("Database"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().total_requests, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_recovers() {
        let breaker = CircuitBreaker::new("Database", config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::advance(Duration::from_millis(1_001)).await;

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let value = breaker
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let mut cfg = config();
        cfg.success_threshold = 2;
        let breaker = CircuitBreaker::new("COODashboard", cfg);
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::advance(Duration::from_millis(1_001)).await;
        breaker.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        // Recovery window restarts from the latest failure.
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(fail(&breaker).await.is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new("SchemaValidation", config());
        let started = Instant::now();

        let err = breaker
            .execute(|| std::future::pending::<QueryResult<()>>())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
        let stats = breaker.stats();
        assert_eq!(stats.failure_count, 1);
        assert!(stats.last_failure_time.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new("Database", config());
        fail(&breaker).await;
        fail(&breaker).await;
        breaker.execute(|| async { Ok(()) }).await.unwrap();
        fail(&breaker).await;

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.success_count, 1);
        assert!(stats.last_success_time.is_some());
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = CircuitBreaker::new("Database", config());
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.stats().uptime_ms, 0);

        breaker.reset();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.total_requests, 0);
        assert!(breaker.is_healthy());
    }

    #[test]
    fn test_state_serializes_uppercase() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
