//! Metrics collection and exposition.
//!
//! # Metrics
//! - `query_cache_lookups_total` (counter): lookups by layer and outcome
//! - `query_cache_entries` (gauge): live entries per layer
//! - `query_dedup_requests_total` (counter): started vs joined requests
//! - `query_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `query_breaker_rejections_total` (counter): fail-fast rejections
//! - `query_store_errors_total` (counter): persisted tier failures by operation
//! - `query_fetch_duration_seconds` (histogram): downstream fetch latency
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels for layer, breaker name and outcome; never the cache key

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_cache_lookup(layer: &'static str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!("query_cache_lookups_total", "layer" => layer, "outcome" => outcome).increment(1);
}

pub fn record_cache_size(layer: &'static str, entries: usize) {
    metrics::gauge!("query_cache_entries", "layer" => layer).set(entries as f64);
}

pub fn record_dedup(joined: bool) {
    let kind = if joined { "joined" } else { "started" };
    metrics::counter!("query_dedup_requests_total", "kind" => kind).increment(1);
}

pub fn record_breaker_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("query_breaker_state", "breaker" => name.to_string()).set(value);
}

pub fn record_breaker_rejection(name: &str) {
    metrics::counter!("query_breaker_rejections_total", "breaker" => name.to_string()).increment(1);
}

pub fn record_store_error(operation: &'static str) {
    metrics::counter!("query_store_errors_total", "operation" => operation).increment(1);
}

pub fn record_fetch(policy: &'static str, success: bool, start: Instant) {
    let status = if success { "ok" } else { "error" };
    metrics::histogram!("query_fetch_duration_seconds", "policy" => policy, "status" => status)
        .record(start.elapsed().as_secs_f64());
}
