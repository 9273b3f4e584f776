//! Replica registry subsystem.
//!
//! # Data Flow
//! ```text
//! config (startup / reload)
//!     → ReplicaRegistry::update (reject empty, build full set)
//!     → ArcSwap installs the new snapshot
//!     → strategies read snapshot per selection, never block each other
//!
//! load monitor (periodic)
//!     → queue depth per replica
//!     → ReplicaRegistry::report_load (atomic store, no swap)
//! ```
//!
//! # Design Decisions
//! - Copy-on-write: updates install a fully-built replacement set; readers
//!   never observe a partially-updated registry
//! - An empty replica set is a fatal misconfiguration, not a valid
//!   transition; the previous set stays active
//! - Load values survive membership updates for replicas that persist

pub mod monitor;
pub mod replica;

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::{DispatchConfig, ReplicaConfig};
pub use monitor::LoadMonitor;
pub use replica::{Replica, ReplicaSet};

/// Registry update errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The proposed replica set was empty.
    #[error("replica set must not be empty")]
    EmptyReplicaSet,
}

/// Process-wide registry of dispatch targets.
pub struct ReplicaRegistry {
    active: ArcSwap<ReplicaSet>,
}

impl ReplicaRegistry {
    /// Build the registry from the initial configuration.
    pub fn new(
        replicas: &[ReplicaConfig],
        dispatch: &DispatchConfig,
    ) -> Result<Self, RegistryError> {
        let set = Self::build_set(replicas, dispatch, None)?;
        Ok(Self {
            active: ArcSwap::from_pointee(set),
        })
    }

    /// Current snapshot, in stable configuration order.
    pub fn snapshot(&self) -> Arc<ReplicaSet> {
        self.active.load_full()
    }

    /// Replace the active set atomically.
    ///
    /// Load values carry over for replicas whose id survives the update.
    /// An empty set is rejected and the previous set remains active.
    pub fn update(
        &self,
        replicas: &[ReplicaConfig],
        dispatch: &DispatchConfig,
    ) -> Result<(), RegistryError> {
        let previous = self.active.load();
        let set = Self::build_set(replicas, dispatch, Some(&previous))?;

        tracing::info!(
            replicas = set.len(),
            fingerprint = set.fingerprint(),
            "Replica registry updated"
        );

        self.active.store(Arc::new(set));
        Ok(())
    }

    /// Record a load report for a replica. Unknown ids are logged and
    /// ignored; the reporter may be racing a membership update.
    pub fn report_load(&self, replica_id: &str, load: f64) {
        let snapshot = self.active.load();
        match snapshot.get(replica_id) {
            Some(replica) => replica.set_load(load),
            None => {
                tracing::debug!(replica_id = %replica_id, "Load report for unknown replica");
            }
        }
    }

    fn build_set(
        replicas: &[ReplicaConfig],
        dispatch: &DispatchConfig,
        previous: Option<&ReplicaSet>,
    ) -> Result<ReplicaSet, RegistryError> {
        if replicas.is_empty() {
            return Err(RegistryError::EmptyReplicaSet);
        }

        let built = replicas
            .iter()
            .map(|config| {
                let replica = Replica::new(
                    config.id.clone(),
                    dispatch.ingest_queue_for(&config.id),
                    config.weight.max(1),
                );
                if let Some(old) = previous.and_then(|set| set.get(&config.id)) {
                    replica.set_load(old.load());
                }
                Arc::new(replica)
            })
            .collect();

        Ok(ReplicaSet::new(built))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;

    fn replica_configs(ids: &[&str]) -> Vec<ReplicaConfig> {
        ids.iter()
            .map(|id| ReplicaConfig {
                id: id.to_string(),
                weight: 1,
            })
            .collect()
    }

    #[test]
    fn test_empty_initial_set_rejected() {
        let result = ReplicaRegistry::new(&[], &DispatchConfig::default());
        assert!(matches!(result, Err(RegistryError::EmptyReplicaSet)));
    }

    #[test]
    fn test_empty_update_keeps_previous_set() {
        let dispatch = DispatchConfig::default();
        let registry = ReplicaRegistry::new(&replica_configs(&["a", "b"]), &dispatch).unwrap();

        let result = registry.update(&[], &dispatch);
        assert!(matches!(result, Err(RegistryError::EmptyReplicaSet)));
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_update_carries_load_forward() {
        let dispatch = DispatchConfig::default();
        let registry = ReplicaRegistry::new(&replica_configs(&["a", "b"]), &dispatch).unwrap();
        registry.report_load("a", 7.0);

        registry
            .update(&replica_configs(&["a", "c"]), &dispatch)
            .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.get("a").unwrap().load(), 7.0);
        assert_eq!(snapshot.get("c").unwrap().load(), 0.0);
        assert!(snapshot.get("b").is_none());
    }

    #[test]
    fn test_queue_names_follow_pattern() {
        let mut dispatch = DispatchConfig::default();
        dispatch.ingest_queue_pattern = "ingest.{replica}.q".to_string();
        let registry = ReplicaRegistry::new(&replica_configs(&["a"]), &dispatch).unwrap();

        assert_eq!(registry.snapshot().get("a").unwrap().queue_name, "ingest.a.q");
    }

    #[test]
    fn test_snapshot_survives_update() {
        let dispatch = DispatchConfig::default();
        let registry = ReplicaRegistry::new(&replica_configs(&["a"]), &dispatch).unwrap();

        let old = registry.snapshot();
        registry
            .update(&replica_configs(&["b"]), &dispatch)
            .unwrap();

        // Readers holding the old snapshot still see a complete set.
        assert_eq!(old.len(), 1);
        assert_eq!(old.replicas()[0].id, "a");
        assert_eq!(registry.snapshot().replicas()[0].id, "b");
    }
}
