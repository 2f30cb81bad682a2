//! Shared utilities for integration and load testing.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use resilient_query::cache::{DataConsistencyManager, PersistentStore};
use resilient_query::config::{CircuitBreakerConfig, QueryLayerConfig};
use resilient_query::context::QueryContext;
use resilient_query::{QueryError, QueryResult};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scriptable stand-in for the remote data service.
#[derive(Clone)]
pub struct MockBackend {
    calls: Arc<AtomicU32>,
    fail_first: u32,
    delay: Duration,
    value: Value,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn returning(value: Value) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            fail_first: 0,
            delay: Duration::ZERO,
            value,
        }
    }

    /// Fail the first `n` calls with a connection error.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn always_failing(self) -> Self {
        self.failing_first(u32::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// A one-shot fetch function recording its call on this backend.
    pub fn fetch(&self) -> impl FnOnce() -> BoxFuture<'static, QueryResult<Value>> + Send + 'static {
        let backend = self.clone();
        move || {
            async move {
                let call = backend.calls.fetch_add(1, Ordering::SeqCst);
                if !backend.delay.is_zero() {
                    tokio::time::sleep(backend.delay).await;
                }
                if call < backend.fail_first {
                    Err(QueryError::message("connection refused"))
                } else {
                    Ok(backend.value.clone())
                }
            }
            .boxed()
        }
    }
}

/// Breaker settings small enough to drive through every state in a test.
#[allow(dead_code)]
pub fn fast_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_timeout_ms: 1_000,
        success_threshold: 1,
        timeout_ms: 500,
    }
}

#[allow(dead_code)]
pub fn test_config() -> QueryLayerConfig {
    let mut config = QueryLayerConfig::default();
    config.breakers.database = fast_breaker();
    config.breakers.dashboard = fast_breaker();
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config
}

#[allow(dead_code)]
pub fn context_over(store: Option<Arc<dyn PersistentStore>>) -> QueryContext {
    QueryContext::with_store(&test_config(), store)
}

/// A fresh manager (as after a restart) sharing `store`.
#[allow(dead_code)]
pub fn manager_over(store: Arc<dyn PersistentStore>) -> Arc<DataConsistencyManager> {
    Arc::clone(&context_over(Some(store)).manager)
}
