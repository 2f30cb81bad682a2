//! Query execution subsystem.
//!
//! # Data Flow
//! ```text
//! batcher.rs (TTL cache, named batches)
//!     → dedup.rs (one in-flight future per key)
//!         → resilience (breaker, timeout)
//! ```

pub mod batcher;
pub mod dedup;

pub use batcher::{BatchOptions, BatchOutcome, BatcherStats, QueryBatcher, QueryOptions};
pub use dedup::RequestDeduplicator;
