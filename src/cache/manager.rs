//! Two-tier cache façade over the shared deduplicator and Database breaker.
//!
//! # Data Flow
//! ```text
//! get_cached_or_fetch(key)
//!     → persisted tier (static keys)
//!     → memory tier
//!     → RequestDeduplicator (joins in-flight fetch)
//!         → memory re-check → CircuitBreaker → fetch
//!         → memory write (+ persisted write for static keys)
//! ```
//!
//! # Design Decisions
//! - Values are held as `serde_json::Value` so one deduplicator serves every
//!   caller type; callers decode into their own `T`
//! - Persisted-tier failures are logged and counted, never returned
//! - Policy comes from the caller when given, else from key markers

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::consistency::{validate_items, ConsistencyReport, Validator};
use crate::cache::persisted::PersistedTier;
use crate::cache::store::{PersistentStore, StoreError};
use crate::cache::sweeper::spawn_sweeper;
use crate::cache::ttl::TtlCache;
use crate::config::CacheConfig;
use crate::error::{QueryError, QueryResult};
use crate::observability::metrics;
use crate::query::dedup::RequestDeduplicator;
use crate::resilience::{BreakerStats, CircuitBreaker};

/// Lifetime class of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Rarely changing reference data; persisted, long TTL.
    Static,
    /// Frequently changing data; memory only, short TTL.
    Dynamic,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::Static => "static",
            CachePolicy::Dynamic => "dynamic",
        }
    }
}

/// Per-call options for [`DataConsistencyManager::get_cached_or_fetch`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub cache_duration: Option<Duration>,
    pub force_refresh: bool,
    pub request_id: Option<String>,
    pub policy: Option<CachePolicy>,
}

impl FetchOptions {
    pub fn cache_duration(mut self, ttl: Duration) -> Self {
        self.cache_duration = Some(ttl);
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub pending: usize,
}

/// One memory-tier key in a [`CacheSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct KeySnapshot {
    pub key: String,
    pub policy: CachePolicy,
    pub remaining_ms: u64,
    pub expired: bool,
}

/// Point-in-time view of the manager for debugging and the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub stats: CacheStats,
    pub entries: Vec<KeySnapshot>,
    pub pending_keys: Vec<String>,
    pub persisted_keys: Vec<String>,
    pub breaker: BreakerStats,
}

pub struct DataConsistencyManager {
    memory: TtlCache<Value>,
    persisted: Option<PersistedTier>,
    deduplicator: Arc<RequestDeduplicator<Value>>,
    breaker: Arc<CircuitBreaker>,
    config: CacheConfig,
}

impl std::fmt::Debug for DataConsistencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataConsistencyManager")
            .field("entries", &self.memory.len())
            .field("persisted", &self.persisted.is_some())
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

fn log_store_error(operation: &'static str, key: &str, err: &StoreError) {
    metrics::record_store_error(operation);
    tracing::warn!(operation, key = %key, error = %err, "Persisted cache operation failed, continuing without it");
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> QueryResult<T> {
    serde_json::from_value(value)
        .map_err(|e| QueryError::Serialization(format!("cached value for '{key}' did not decode: {e}")))
}

impl DataConsistencyManager {
    pub fn new(
        config: CacheConfig,
        breaker: Arc<CircuitBreaker>,
        deduplicator: Arc<RequestDeduplicator<Value>>,
    ) -> Self {
        Self {
            memory: TtlCache::new(),
            persisted: None,
            deduplicator,
            breaker,
            config,
        }
    }

    /// Attach the persisted tier used for static keys.
    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.persisted = Some(PersistedTier::new(store));
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Policy for `key` from the configured static markers.
    pub fn classify(&self, key: &str) -> CachePolicy {
        if self.config.static_markers.iter().any(|m| key.contains(m.as_str())) {
            CachePolicy::Static
        } else {
            CachePolicy::Dynamic
        }
    }

    fn default_ttl(&self, policy: CachePolicy) -> Duration {
        match policy {
            CachePolicy::Static => self.config.static_ttl(),
            CachePolicy::Dynamic => self.config.dynamic_ttl(),
        }
    }

    fn read_persisted<T: DeserializeOwned>(&self, tier: &PersistedTier, key: &str) -> Option<T> {
        match tier.read(key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Persisted entry has an unexpected shape, evicting");
                    if let Err(err) = tier.remove(key) {
                        log_store_error("remove", key, &err);
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                log_store_error("read", key, &err);
                None
            }
        }
    }

    /// Cached data for `cache_key`, or the result of `fetch`.
    ///
    /// Concurrent callers for the same key share one `fetch`. Fetch errors
    /// are logged with the request id and returned unchanged.
    pub async fn get_cached_or_fetch<T, F, Fut>(
        &self,
        cache_key: &str,
        fetch: F,
        options: FetchOptions,
    ) -> QueryResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        let policy = options.policy.unwrap_or_else(|| self.classify(cache_key));
        let ttl = options.cache_duration.unwrap_or_else(|| self.default_ttl(policy));
        let request_id = options
            .request_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let persisted = match policy {
            CachePolicy::Static => self.persisted.clone(),
            CachePolicy::Dynamic => None,
        };

        if !options.force_refresh {
            if let Some(tier) = &persisted {
                let hit = self.read_persisted::<T>(tier, cache_key);
                metrics::record_cache_lookup("persisted", hit.is_some());
                if let Some(data) = hit {
                    tracing::debug!(key = %cache_key, request_id = %request_id, "Persisted cache hit");
                    return Ok(data);
                }
            }

            let cached = self.memory.get(cache_key);
            metrics::record_cache_lookup("memory", cached.is_some());
            if let Some(value) = cached {
                tracing::debug!(key = %cache_key, request_id = %request_id, "Memory cache hit");
                return decode(cache_key, value);
            }
        }

        let memory = self.memory.clone();
        let breaker = Arc::clone(&self.breaker);
        let key = cache_key.to_string();
        let force_refresh = options.force_refresh;

        let result = self
            .deduplicator
            .execute(cache_key, move || async move {
                if !force_refresh {
                    if let Some(value) = memory.get(&key) {
                        return Ok(value);
                    }
                }

                let started = std::time::Instant::now();
                let fetched = breaker.execute(fetch).await;
                metrics::record_fetch(policy.as_str(), fetched.is_ok(), started);
                let value = serde_json::to_value(fetched?)?;

                memory.insert(key.clone(), value.clone(), ttl);
                metrics::record_cache_size("memory", memory.len());
                if let Some(tier) = persisted {
                    // File-backed stores rewrite the whole file; keep that off the async workers.
                    let (owned_key, owned_value) = (key.clone(), value.clone());
                    let write = tokio::task::spawn_blocking(move || {
                        tier.write(&owned_key, &owned_value, ttl)
                    });
                    match write.await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => log_store_error("write", &key, &err),
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "Persisted cache write task failed")
                        }
                    }
                }
                Ok(value)
            })
            .await;

        match result {
            Ok(value) => decode(cache_key, value),
            Err(e) => {
                tracing::warn!(key = %cache_key, request_id = %request_id, error = %e, "Fetch failed");
                Err(e)
            }
        }
    }

    /// Store `data` under `key` as if it had just been fetched.
    ///
    /// Only `cache_duration` and `policy` of `options` apply.
    pub fn set_cached_data<T: Serialize>(&self, key: &str, data: &T, options: &FetchOptions) -> QueryResult<()> {
        let policy = options.policy.unwrap_or_else(|| self.classify(key));
        let ttl = options.cache_duration.unwrap_or_else(|| self.default_ttl(policy));
        let value = serde_json::to_value(data)?;

        if policy == CachePolicy::Static {
            if let Some(tier) = &self.persisted {
                if let Err(err) = tier.write(key, &value, ttl) {
                    log_store_error("write", key, &err);
                }
            }
        }
        self.memory.insert(key, value, ttl);
        Ok(())
    }

    /// Drop `key` from both tiers. Returns whether the memory tier held it.
    pub fn invalidate_cache(&self, key: &str) -> bool {
        let removed = self.memory.remove(key);
        if let Some(tier) = &self.persisted {
            if let Err(err) = tier.remove(key) {
                log_store_error("remove", key, &err);
            }
        }
        tracing::debug!(key = %key, removed, "Invalidated cache key");
        removed
    }

    /// Drop every key matching `pattern` from both tiers.
    pub fn invalidate_cache_pattern(&self, pattern: &Regex) -> usize {
        let mut removed = self.memory.remove_matching(pattern);

        if let Some(tier) = &self.persisted {
            match tier.cache_keys() {
                Ok(keys) => {
                    for key in keys.iter().filter(|k| pattern.is_match(k)) {
                        match tier.remove(key) {
                            Ok(()) => removed += 1,
                            Err(err) => log_store_error("remove", key, &err),
                        }
                    }
                }
                Err(err) => log_store_error("keys", pattern.as_str(), &err),
            }
        }

        tracing::info!(pattern = %pattern, removed, "Invalidated cache keys by pattern");
        removed
    }

    /// Empty both tiers and forget in-flight bookkeeping.
    pub fn clear_all(&self) {
        self.memory.clear();
        self.deduplicator.cancel_all();

        if let Some(tier) = &self.persisted {
            match tier.cache_keys() {
                Ok(keys) => {
                    for key in keys {
                        if let Err(err) = tier.remove(&key) {
                            log_store_error("remove", &key, &err);
                        }
                    }
                }
                Err(err) => log_store_error("keys", "*", &err),
            }
        }
        metrics::record_cache_size("memory", 0);
        tracing::info!("Cleared all cached data");
    }

    pub fn cache_stats(&self) -> CacheStats {
        let ttl = self.memory.stats();
        CacheStats {
            total: ttl.total,
            valid: ttl.valid,
            expired: ttl.expired,
            pending: self.deduplicator.active_count(),
        }
    }

    /// Sweep expired memory entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let removed = self.memory.sweep_expired();
        metrics::record_cache_size("memory", self.memory.len());
        removed
    }

    /// Run `cleanup` every `cleanup_interval` until shutdown.
    pub fn spawn_cleanup(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        spawn_sweeper("consistency", self.config.cleanup_interval(), shutdown, move || {
            manager.cleanup()
        })
    }

    pub fn validate_data_consistency<T>(&self, items: &[T], validators: &[Validator<T>]) -> ConsistencyReport {
        let report = validate_items(items, validators);
        if !report.is_valid {
            tracing::warn!(failures = report.errors.len(), checked = report.checked, "Data consistency check failed");
        }
        report
    }

    /// Log and return the current cache state.
    pub fn debug_cache_state(&self) -> CacheSnapshot {
        let mut entries: Vec<KeySnapshot> = self
            .memory
            .keys()
            .into_iter()
            .filter_map(|key| {
                let entry = self.memory.peek(&key)?;
                Some(KeySnapshot {
                    policy: self.classify(&key),
                    remaining_ms: entry.remaining().as_millis() as u64,
                    expired: entry.is_expired(),
                    key,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let persisted_keys = match &self.persisted {
            Some(tier) => tier.cache_keys().unwrap_or_else(|err| {
                log_store_error("keys", "*", &err);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let snapshot = CacheSnapshot {
            stats: self.cache_stats(),
            entries,
            pending_keys: self.deduplicator.active_keys(),
            persisted_keys,
            breaker: self.breaker.stats(),
        };

        tracing::info!(
            total = snapshot.stats.total,
            valid = snapshot.stats.valid,
            expired = snapshot.stats.expired,
            pending = snapshot.stats.pending,
            persisted = snapshot.persisted_keys.len(),
            breaker_state = %snapshot.breaker.state,
            "Cache state"
        );
        snapshot
    }
}
