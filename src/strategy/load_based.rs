//! Load-based selection.
//!
//! Routes to the replica with the lowest currently-reported load. Trades
//! key affinity for load fairness; the routing key is ignored.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::trace;

use super::{SelectError, SelectionStrategy};
use crate::registry::{Replica, ReplicaSet};

/// Selects the replica with the minimum `current_load`.
///
/// Ties break by replica id ascending so behavior is reproducible; when all
/// loads are stale or zero this degrades to the registry's natural order,
/// which is equivalent to plain round-robin under uniform load.
#[derive(Debug, Default)]
pub struct LoadBasedStrategy;

impl LoadBasedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LoadBasedStrategy {
    fn select(&self, set: &ReplicaSet, _routing_key: &str) -> Result<Arc<Replica>, SelectError> {
        let picked = set
            .replicas()
            .iter()
            .min_by(|a, b| {
                a.load()
                    .partial_cmp(&b.load())
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .ok_or(SelectError::NoAvailableReplica)?;

        trace!(replica_id = %picked.id, load = picked.load(), "Selected least loaded");
        Ok(picked.clone())
    }

    fn name(&self) -> &'static str {
        "LoadBased"
    }
}
