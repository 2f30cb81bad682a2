//! Caching subsystem.
//!
//! # Data Flow
//! ```text
//! manager.rs (policy, invalidation, stats)
//!     → persisted.rs (static keys, `cache_<key>` JSON entries)
//!         → store.rs (file or in-memory backend)
//!     → ttl.rs (memory tier, every key)
//!     → sweeper.rs (periodic expiry sweep)
//! ```
//!
//! # Design Decisions
//! - The memory tier is authoritative while a process runs; the persisted
//!   tier only outlives it
//! - Expired entries are never served from either tier

pub mod consistency;
pub mod manager;
pub mod persisted;
pub mod store;
pub mod sweeper;
pub mod ttl;

pub use consistency::{ConsistencyReport, Validator};
pub use manager::{CachePolicy, CacheSnapshot, CacheStats, DataConsistencyManager, FetchOptions};
pub use persisted::{PersistedEntry, PersistedTier};
pub use store::{JsonFileStore, MemoryStore, PersistentStore, StoreError};
pub use ttl::{CacheEntry, TtlCache, TtlStats};
