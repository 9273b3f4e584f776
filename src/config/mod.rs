//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatcherConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → replica registry installs the new set atomically
//!     → strategies observe the new set fingerprint and rebuild
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A reload with an empty replica set is rejected, never installed

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::BrokerConfig;
pub use schema::DispatchConfig;
pub use schema::DispatcherConfig;
pub use schema::ReplicaConfig;
pub use schema::RetryConfig;
pub use schema::StrategyKind;
