//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds and timeouts > 0)
//! - Check addresses parse before anything binds them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: QueryLayerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CircuitBreakerConfig, QueryLayerConfig};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &QueryLayerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_breaker("breakers.database", &config.breakers.database, &mut errors);
    validate_breaker("breakers.dashboard", &config.breakers.dashboard, &mut errors);
    validate_breaker(
        "breakers.schema_validation",
        &config.breakers.schema_validation,
        &mut errors,
    );

    if config.batcher.default_timeout_ms == 0 {
        errors.push(ValidationError::new("batcher.default_timeout_ms", "must be greater than 0"));
    }
    if config.batcher.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new("batcher.cleanup_interval_secs", "must be greater than 0"));
    }

    if config.cache.static_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.static_ttl_secs", "must be greater than 0"));
    }
    if config.cache.dynamic_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.dynamic_ttl_secs", "must be greater than 0"));
    }
    if config.cache.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new("cache.cleanup_interval_secs", "must be greater than 0"));
    }
    if config.cache.static_markers.iter().any(|m| m.trim().is_empty()) {
        errors.push(ValidationError::new(
            "cache.static_markers",
            "empty marker would classify every key as static",
        ));
    }
    if config.cache.persistence.enabled && config.cache.persistence.path.trim().is_empty() {
        errors.push(ValidationError::new("cache.persistence.path", "required when persistence is enabled"));
    }

    if config.retries.enabled {
        if config.retries.max_attempts == 0 {
            errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
        }
        if config.retries.base_delay_ms > config.retries.max_delay_ms {
            errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed retries.max_delay_ms"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a valid socket address"));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a valid socket address"));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin API is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.failure_threshold"), "must be at least 1"));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{prefix}.success_threshold"), "must be at least 1"));
    }
    if breaker.timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.timeout_ms"), "must be greater than 0"));
    }
}
