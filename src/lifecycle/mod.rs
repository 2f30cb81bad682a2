//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → sweepers and admin server exit → drain with deadline
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every background task subscribes
//! - Draining has a deadline; stragglers are aborted

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
