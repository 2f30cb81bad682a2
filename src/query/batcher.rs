//! TTL-cached, de-duplicated query execution and named batches.
//!
//! # Responsibilities
//! - Serve repeated queries from cache inside their TTL
//! - Join a query already in flight instead of starting another
//! - Run heterogeneous named queries concurrently with partial-failure results
//!
//! # Design Decisions
//! - Cache hits never enter the de-duplication path
//! - Only successes are cached; the pending entry is removed either way
//! - An optional circuit breaker wraps every cache-missing query

use futures_util::future::{join_all, try_join_all};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::sweeper::spawn_sweeper;
use crate::cache::ttl::{TtlCache, TtlStats};
use crate::config::BatcherConfig;
use crate::error::{QueryError, QueryResult};
use crate::observability::metrics;
use crate::query::dedup::RequestDeduplicator;
use crate::resilience::{with_timeout, CircuitBreaker};

/// Per-query options for [`QueryBatcher::execute`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Cache lifetime of the result; the batcher default when `None`.
    pub ttl: Option<Duration>,
    /// Ignore any cached value (a pending query is still joined).
    pub skip_cache: bool,
    /// Query deadline; the batcher default when `None`.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

/// Options for [`QueryBatcher::batch_execute`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub timeout: Option<Duration>,
    /// Return the first error instead of partitioning results.
    pub fail_fast: bool,
}

/// Results of a batch keyed by query name.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub results: HashMap<String, T>,
    pub errors: HashMap<String, QueryError>,
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatcherStats {
    pub cache: TtlStats,
    pub pending: usize,
}

/// Query executor combining a TTL cache, de-duplication and an optional breaker.
pub struct QueryBatcher<T> {
    cache: TtlCache<T>,
    pending: RequestDeduplicator<T>,
    breaker: Option<Arc<CircuitBreaker>>,
    config: BatcherConfig,
}

impl<T> QueryBatcher<T> {
    pub fn new(config: BatcherConfig) -> Self {
        Self {
            cache: TtlCache::new(),
            pending: RequestDeduplicator::new(),
            breaker: None,
            config,
        }
    }

    /// Route every cache-missing query through `breaker`.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Drop every cached entry, or only keys matching `pattern`.
    pub fn clear_cache(&self, pattern: Option<&Regex>) -> usize {
        let removed = match pattern {
            Some(pattern) => self.cache.remove_matching(pattern),
            None => {
                let count = self.cache.len();
                self.cache.clear();
                count
            }
        };
        metrics::record_cache_size("batcher", self.cache.len());
        tracing::debug!(pattern = ?pattern.map(Regex::as_str), removed, "Cleared query cache");
        removed
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.remove(key)
    }

    pub fn clean_expired_entries(&self) -> usize {
        let removed = self.cache.sweep_expired();
        metrics::record_cache_size("batcher", self.cache.len());
        removed
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            cache: self.cache.stats(),
            pending: self.pending.active_count(),
        }
    }

    /// Run `queries` concurrently, each under its own timeout.
    ///
    /// Without `fail_fast` this never fails: every query lands in either
    /// `results` or `errors`. With `fail_fast` the first error is returned.
    pub async fn batch_execute<I, K, Fut>(&self, queries: I, options: BatchOptions) -> QueryResult<BatchOutcome<T>>
    where
        I: IntoIterator<Item = (K, Fut)>,
        K: Into<String>,
        Fut: Future<Output = QueryResult<T>>,
    {
        let timeout = options.timeout.unwrap_or_else(|| self.config.default_timeout());
        let guarded: Vec<_> = queries
            .into_iter()
            .map(|(key, fut)| {
                let key = key.into();
                async move {
                    let result = with_timeout(&key, timeout, fut).await;
                    (key, result)
                }
            })
            .collect();

        tracing::debug!(queries = guarded.len(), fail_fast = options.fail_fast, "Executing query batch");

        if options.fail_fast {
            let results = try_join_all(guarded.into_iter().map(|query| async move {
                let (key, result) = query.await;
                result.map(|value| (key, value))
            }))
            .await?;
            return Ok(BatchOutcome {
                results: results.into_iter().collect(),
                errors: HashMap::new(),
            });
        }

        let mut outcome = BatchOutcome {
            results: HashMap::new(),
            errors: HashMap::new(),
        };
        for (key, result) in join_all(guarded).await {
            match result {
                Ok(value) => {
                    outcome.results.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!(query = %key, error = %e, "Batched query failed");
                    outcome.errors.insert(key, e);
                }
            }
        }
        Ok(outcome)
    }
}

impl<T> QueryBatcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Cached value for `key`, or the result of `query_fn` (shared with any
    /// concurrent caller for the same key).
    pub async fn execute<F, Fut>(&self, key: &str, query_fn: F, options: QueryOptions) -> QueryResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        if !options.skip_cache {
            let cached = self.cache.get(key);
            metrics::record_cache_lookup("batcher", cached.is_some());
            if let Some(value) = cached {
                tracing::trace!(key = %key, "Query cache hit");
                return Ok(value);
            }
        }

        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        let timeout = options.timeout.unwrap_or_else(|| self.config.default_timeout());
        let cache = self.cache.clone();
        let breaker = self.breaker.clone();
        let owned_key = key.to_string();

        self.pending
            .execute(key, move || async move {
                let guarded = with_timeout(&owned_key, timeout, query_fn());
                let result = match breaker {
                    Some(breaker) => breaker.execute(|| guarded).await,
                    None => guarded.await,
                };
                if let Ok(value) = &result {
                    cache.insert(owned_key.clone(), value.clone(), ttl);
                    metrics::record_cache_size("batcher", cache.len());
                }
                result
            })
            .await
    }

    /// Sweep expired entries every `cleanup_interval` until shutdown.
    pub fn spawn_cleanup(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let batcher = Arc::clone(self);
        spawn_sweeper("batcher", self.config.cleanup_interval(), shutdown, move || {
            batcher.clean_expired_entries()
        })
    }
}
