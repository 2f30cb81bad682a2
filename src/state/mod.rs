//! Application state: the principal consumer of fetched data.
//!
//! # Data Flow
//! ```text
//! StateStore::load → DataConsistencyManager → AppAction
//!     → reducer.rs (pure transition) → watch channel → subscribers
//! ```

pub mod model;
pub mod reducer;
pub mod store;

pub use model::{AppState, Slice};
pub use reducer::{reduce, AppAction};
pub use store::StateStore;
