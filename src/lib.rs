//! Resilient query layer: de-duplicated, cached, circuit-protected data access.

pub mod admin;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod query;
pub mod resilience;
pub mod state;

pub use cache::{CachePolicy, DataConsistencyManager, FetchOptions};
pub use config::QueryLayerConfig;
pub use context::QueryContext;
pub use error::{QueryError, QueryResult};
pub use lifecycle::Shutdown;
