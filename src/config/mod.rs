//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → QueryLayerConfig (validated, immutable)
//!     → consumed once by QueryContext::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BatcherConfig, BreakersConfig, CacheConfig, CircuitBreakerConfig, LogFormat,
    ObservabilityConfig, PersistenceConfig, QueryLayerConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
