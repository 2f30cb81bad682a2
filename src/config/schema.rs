//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the query layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the resilient query layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct QueryLayerConfig {
    /// One breaker per logical backend dependency.
    pub breakers: BreakersConfig,

    /// Query batcher defaults.
    pub batcher: BatcherConfig,

    /// Data consistency manager cache policy.
    pub cache: CacheConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin introspection API.
    pub admin: AdminConfig,
}

/// Circuit breaker tuning for a single dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial call, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Successes in half-open needed to close the circuit.
    pub success_threshold: u32,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            success_threshold: 2,
            timeout_ms: 10_000,
        }
    }
}

/// Breakers owned by the query context.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakersConfig {
    /// Primary database access.
    pub database: CircuitBreakerConfig,

    /// Executive dashboard aggregation queries.
    pub dashboard: CircuitBreakerConfig,

    /// Schema validation checks.
    pub schema_validation: CircuitBreakerConfig,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            database: CircuitBreakerConfig::default(),
            dashboard: CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout_ms: 60_000,
                success_threshold: 1,
                timeout_ms: 15_000,
            },
            schema_validation: CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout_ms: 120_000,
                success_threshold: 1,
                timeout_ms: 5_000,
            },
        }
    }
}

/// Query batcher defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// TTL applied to cached query results, in milliseconds.
    pub default_ttl_ms: u64,

    /// Timeout applied to each query, in milliseconds.
    pub default_timeout_ms: u64,

    /// Interval between expired-entry sweeps, in seconds.
    pub cleanup_interval_secs: u64,
}

impl BatcherConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            default_timeout_ms: 10_000,
            cleanup_interval_secs: 300,
        }
    }
}

/// Cache policy for the data consistency manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default TTL for static data (team lists, sprints), in seconds.
    pub static_ttl_secs: u64,

    /// Default TTL for everything else, in seconds.
    pub dynamic_ttl_secs: u64,

    /// Key substrings that mark a key as static when the caller gives no policy.
    pub static_markers: Vec<String>,

    /// Interval between expired-entry sweeps, in seconds.
    pub cleanup_interval_secs: u64,

    /// Persisted tier for static keys.
    pub persistence: PersistenceConfig,
}

impl CacheConfig {
    pub fn static_ttl(&self) -> Duration {
        Duration::from_secs(self.static_ttl_secs)
    }

    pub fn dynamic_ttl(&self) -> Duration {
        Duration::from_secs(self.dynamic_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            static_ttl_secs: 2 * 60 * 60,
            dynamic_ttl_secs: 30 * 60,
            static_markers: [
                "teams",
                "team_members",
                "global_sprint",
                "operational_teams",
                "coo_dashboard_data",
                "company_hours_status",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            cleanup_interval_secs: 300,
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Persisted (cross-restart) cache tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Enable the persisted tier.
    pub enabled: bool,

    /// Path of the JSON file backing the tier.
    pub path: String,

    /// Maximum number of persisted entries; writes beyond it are refused.
    pub max_entries: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "query_cache.json".to_string(),
            max_entries: 1_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin introspection API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryLayerConfig::default();
        assert_eq!(config.batcher.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.batcher.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.static_ttl(), Duration::from_secs(7200));
        assert_eq!(config.cache.dynamic_ttl(), Duration::from_secs(1800));
        assert!(config.cache.static_markers.iter().any(|m| m == "global_sprint"));
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_partial_toml() {
        let config: QueryLayerConfig = toml::from_str(
            r#"
            [breakers.database]
            failure_threshold = 3

            [cache]
            dynamic_ttl_secs = 60

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.breakers.database.failure_threshold, 3);
        assert_eq!(config.breakers.database.timeout_ms, 10_000);
        assert_eq!(config.cache.dynamic_ttl_secs, 60);
        assert_eq!(config.cache.static_ttl_secs, 7200);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
