//! Telemetry dispatch engine library.

pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod strategy;
pub mod transport;

pub use config::DispatcherConfig;
pub use dispatch::DispatchEngine;
pub use lifecycle::Shutdown;
pub use registry::ReplicaRegistry;
pub use transport::{BrokerLink, MemoryTransport, TelemetryMessage};
