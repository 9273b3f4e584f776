//! Replica selection strategies.
//!
//! # Data Flow
//! ```text
//! Delivery arrives → routing key extracted
//!     → active SelectionStrategy reads the registry snapshot
//!     → Apply selection algorithm:
//!         - consistent_hash.rs (ring lookup, key affinity)
//!         - load_based.rs (lowest reported load)
//!         - weighted_round_robin.rs (proportional interleaving)
//!     → Return target replica or NoAvailableReplica
//! ```
//!
//! # Design Decisions
//! - Strategies hold only derived state (ring, cursor), rebuilt whenever
//!   the snapshot fingerprint changes; the registry owns membership
//! - The strategy is a closed enum resolved once at startup; no name-based
//!   lookup happens on the dispatch path
//! - Selection never mutates the replica set and is safe under concurrent
//!   dispatches

pub mod consistent_hash;
pub mod load_based;
pub mod weighted_round_robin;

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::ConsistentHashConfig;
use crate::config::StrategyKind;
use crate::registry::{Replica, ReplicaSet};

pub use consistent_hash::ConsistentHashStrategy;
pub use load_based::LoadBasedStrategy;
pub use weighted_round_robin::WeightedRoundRobinStrategy;

/// Selection-time errors.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The registry snapshot contained no replicas.
    #[error("no replica available for dispatch")]
    NoAvailableReplica,
}

/// A replica selection algorithm.
///
/// Implementations must be safe for concurrent calls: any internal derived
/// state is mutated as a single atomic step per selection.
pub trait SelectionStrategy: Send + Sync {
    /// Pick a replica from the snapshot for the given routing key.
    fn select(&self, set: &ReplicaSet, routing_key: &str) -> Result<Arc<Replica>, SelectError>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

/// Resolve the configured strategy to an instance. Called once at startup;
/// the instance lives for the process lifetime.
pub fn build_strategy(
    kind: StrategyKind,
    hash_config: &ConsistentHashConfig,
) -> Box<dyn SelectionStrategy> {
    match kind {
        StrategyKind::ConsistentHashing => Box::new(ConsistentHashStrategy::with_virtual_nodes(
            hash_config.replication_factor,
        )),
        StrategyKind::LoadBased => Box::new(LoadBasedStrategy::new()),
        StrategyKind::WeightedRoundRobin => Box::new(WeightedRoundRobinStrategy::new()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a snapshot of replicas "replica-1".."replica-n" with the given
    /// weights.
    pub fn replica_set(weights: &[u32]) -> ReplicaSet {
        let replicas = weights
            .iter()
            .enumerate()
            .map(|(i, &weight)| {
                let id = format!("replica-{}", i + 1);
                Arc::new(Replica::new(id.clone(), format!("ingest.{}", id), weight))
            })
            .collect();
        ReplicaSet::new(replicas)
    }
}
