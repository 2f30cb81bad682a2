use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::AdminState;
use crate::cache::{CacheSnapshot, CacheStats};
use crate::query::BatcherStats;
use crate::resilience::BreakerStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub batcher: BatcherStats,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub key: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedCount {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.into() }))
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let ctx = &state.context;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if ctx.is_healthy() { "operational" } else { "degraded" },
        uptime_secs: ctx.uptime().as_secs(),
        cache: ctx.manager.cache_stats(),
        batcher: ctx.batcher.stats(),
    })
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerStats>> {
    Json(state.context.breakers().iter().map(|b| b.stats()).collect())
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> ApiResult<BreakerStats> {
    let breaker = state.context.breaker(&name).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: format!("no circuit breaker named '{name}'"),
            }),
        )
    })?;

    breaker.reset();
    tracing::info!(breaker = %breaker.name(), "Circuit breaker reset via admin API");
    Ok(Json(breaker.stats()))
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheSnapshot> {
    Json(state.context.manager.debug_cache_state())
}

pub async fn invalidate_cache(
    State(state): State<AdminState>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<RemovedCount> {
    let ctx = &state.context;
    let removed = match (request.key, request.pattern) {
        (Some(key), None) => {
            usize::from(ctx.manager.invalidate_cache(&key)) + usize::from(ctx.batcher.invalidate(&key))
        }
        (None, Some(pattern)) => {
            let re = Regex::new(&pattern).map_err(|e| bad_request(format!("invalid pattern: {e}")))?;
            ctx.manager.invalidate_cache_pattern(&re) + ctx.batcher.clear_cache(Some(&re))
        }
        _ => return Err(bad_request("exactly one of 'key' or 'pattern' is required")),
    };

    Ok(Json(RemovedCount { removed }))
}

pub async fn cleanup_cache(State(state): State<AdminState>) -> Json<RemovedCount> {
    let ctx = &state.context;
    let removed = ctx.manager.cleanup() + ctx.batcher.clean_expired_entries();
    tracing::info!(removed, "Expired cache entries swept via admin API");
    Json(RemovedCount { removed })
}
