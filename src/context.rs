//! Process-wide query components, built once and shared by `Arc`.
//!
//! # Responsibilities
//! - Own one circuit breaker per logical dependency
//! - Share one deduplicator between the consistency manager and its callers
//! - Open the persisted store named in the config
//! - Start and stop the periodic cache sweeps

use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::{DataConsistencyManager, JsonFileStore, PersistentStore};
use crate::config::{PersistenceConfig, QueryLayerConfig, RetryConfig};
use crate::error::QueryResult;
use crate::lifecycle::Shutdown;
use crate::query::{QueryBatcher, RequestDeduplicator};
use crate::resilience::{retry_with_backoff, CircuitBreaker};

pub const DATABASE_BREAKER: &str = "Database";
pub const DASHBOARD_BREAKER: &str = "COODashboard";
pub const SCHEMA_VALIDATION_BREAKER: &str = "SchemaValidation";

pub struct QueryContext {
    pub database: Arc<CircuitBreaker>,
    pub dashboard: Arc<CircuitBreaker>,
    pub schema_validation: Arc<CircuitBreaker>,
    pub deduplicator: Arc<RequestDeduplicator<Value>>,
    pub batcher: Arc<QueryBatcher<Value>>,
    pub manager: Arc<DataConsistencyManager>,
    retries: RetryConfig,
    started_at: Instant,
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("manager", &self.manager)
            .field("pending", &self.deduplicator.active_count())
            .finish_non_exhaustive()
    }
}

/// Open the persisted store described by `config`.
///
/// Returns `None` when persistence is disabled or the file cannot be opened;
/// the manager then runs without a persisted tier.
pub fn open_store(config: &PersistenceConfig) -> Option<Arc<dyn PersistentStore>> {
    if !config.enabled {
        tracing::info!("Persisted cache tier disabled");
        return None;
    }

    match JsonFileStore::open(Path::new(&config.path), config.max_entries) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(path = %config.path, error = %e, "Failed to open persisted cache, continuing without it");
            None
        }
    }
}

impl QueryContext {
    /// Build every component from `config`, opening the configured store.
    pub fn from_config(config: &QueryLayerConfig) -> Self {
        Self::with_store(config, open_store(&config.cache.persistence))
    }

    /// Build every component from `config` over an explicit store.
    pub fn with_store(config: &QueryLayerConfig, store: Option<Arc<dyn PersistentStore>>) -> Self {
        let database = Arc::new(CircuitBreaker::new(DATABASE_BREAKER, config.breakers.database.clone()));
        let dashboard = Arc::new(CircuitBreaker::new(DASHBOARD_BREAKER, config.breakers.dashboard.clone()));
        let schema_validation = Arc::new(CircuitBreaker::new(
            SCHEMA_VALIDATION_BREAKER,
            config.breakers.schema_validation.clone(),
        ));
        let deduplicator = Arc::new(RequestDeduplicator::new());

        let batcher = Arc::new(QueryBatcher::new(config.batcher.clone()).with_breaker(Arc::clone(&dashboard)));

        let persisted = store.is_some();
        let mut manager = DataConsistencyManager::new(
            config.cache.clone(),
            Arc::clone(&database),
            Arc::clone(&deduplicator),
        );
        if let Some(store) = store {
            manager = manager.with_store(store);
        }

        tracing::debug!(persisted, "Query context initialized");

        Self {
            database,
            dashboard,
            schema_validation,
            deduplicator,
            batcher,
            manager: Arc::new(manager),
            retries: config.retries.clone(),
            started_at: Instant::now(),
        }
    }

    pub fn breakers(&self) -> [&Arc<CircuitBreaker>; 3] {
        [&self.database, &self.dashboard, &self.schema_validation]
    }

    /// Breaker by name, ignoring case.
    pub fn breaker(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers()
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }

    /// True while every breaker is closed.
    pub fn is_healthy(&self) -> bool {
        self.breakers().iter().all(|b| b.is_healthy())
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Run `f` with the configured retry policy.
    pub async fn with_retries<T, F, Fut>(&self, operation: &str, f: F) -> QueryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        retry_with_backoff(&self.retries, operation, f).await
    }

    /// Start the periodic cache sweeps; they stop on `shutdown`.
    pub fn spawn_maintenance(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        vec![
            self.manager.spawn_cleanup(shutdown.subscribe()),
            self.batcher.spawn_cleanup(shutdown.subscribe()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    #[test]
    fn test_breakers_by_name() {
        let ctx = QueryContext::with_store(&QueryLayerConfig::default(), None);
        assert_eq!(ctx.breaker("database").map(|b| b.name()), Some(DATABASE_BREAKER));
        assert_eq!(ctx.breaker("COODashboard").map(|b| b.name()), Some(DASHBOARD_BREAKER));
        assert!(ctx.breaker("storage").is_none());
        assert!(ctx.is_healthy());
    }

    #[test]
    fn test_disabled_persistence_has_no_store() {
        let mut config = QueryLayerConfig::default();
        config.cache.persistence.enabled = false;
        assert!(open_store(&config.cache.persistence).is_none());
    }

    #[test]
    fn test_unreadable_store_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "garbage").unwrap();

        let mut config = QueryLayerConfig::default();
        config.cache.persistence.path = path.display().to_string();
        assert!(open_store(&config.cache.persistence).is_none());
    }

    #[tokio::test]
    async fn test_maintenance_stops_on_shutdown() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let ctx = QueryContext::with_store(&QueryLayerConfig::default(), Some(store));
        let shutdown = Shutdown::new();

        let tasks = ctx.spawn_maintenance(&shutdown);
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        let finished = shutdown.drain(tasks, std::time::Duration::from_secs(1)).await;
        assert_eq!(finished, 2);
    }
}
