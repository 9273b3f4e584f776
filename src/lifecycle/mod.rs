//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build registry/strategy/engine → Run
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop consuming → Drain in-flight dispatches → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop consuming first, then drain, then close
//! - No dispatch is acknowledged or requeued after cancellation without
//!   completing its confirm/fail round-trip

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
