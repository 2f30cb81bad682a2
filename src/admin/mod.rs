//! Authenticated introspection and maintenance endpoints.
//!
//! # Responsibilities
//! - Expose breaker and cache state over HTTP
//! - Reset breakers and invalidate or sweep caches on request
//!
//! # Design Decisions
//! - Every route sits behind a bearer-token check
//! - Handlers only read or poke the shared `QueryContext`; no state of their own

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::context::QueryContext;

#[derive(Clone)]
pub struct AdminState {
    pub context: Arc<QueryContext>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(context: Arc<QueryContext>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            context,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/invalidate", post(invalidate_cache))
        .route("/admin/cache/cleanup", post(cleanup_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
