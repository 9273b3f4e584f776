//! Replica abstraction.
//!
//! # Responsibilities
//! - Represent a single worker replica and its ingest queue
//! - Track the replica's current load metric (for the load-based strategy)
//! - Provide an immutable, fingerprinted snapshot of the replica set

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single worker replica.
///
/// Membership fields (`id`, `queue_name`, `weight`) are immutable for the
/// lifetime of a snapshot; only the load metric is updated in place, through
/// an atomic, so readers never need a lock.
#[derive(Debug)]
pub struct Replica {
    /// Unique replica identifier.
    pub id: String,
    /// Ingest queue this replica consumes from.
    pub queue_name: String,
    /// Weight for weighted round-robin (>= 1).
    pub weight: u32,
    /// Current load metric, stored as f64 bits.
    current_load: AtomicU64,
}

impl Replica {
    /// Create a new replica with zero load.
    pub fn new(id: impl Into<String>, queue_name: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            queue_name: queue_name.into(),
            weight,
            current_load: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Current load metric.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.current_load.load(Ordering::Relaxed))
    }

    /// Update the load metric. Negative values are clamped to zero.
    pub fn set_load(&self, load: f64) {
        let load = if load.is_finite() { load.max(0.0) } else { 0.0 };
        self.current_load.store(load.to_bits(), Ordering::Relaxed);
    }
}

/// An immutable snapshot of the active replica set.
///
/// Order is the configuration order and is stable for the snapshot's
/// lifetime. The fingerprint covers ids and weights; strategies use it to
/// invalidate derived state (hash ring, round-robin cursor) when the set
/// changes.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    replicas: Vec<Arc<Replica>>,
    fingerprint: u64,
}

impl ReplicaSet {
    /// Build a snapshot from an ordered list of replicas.
    pub fn new(replicas: Vec<Arc<Replica>>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for replica in &replicas {
            hasher.update(replica.id.as_bytes());
            hasher.update(&replica.weight.to_le_bytes());
        }
        let hash = hasher.finalize();
        let bytes = hash.as_bytes();
        let fingerprint = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);

        Self {
            replicas,
            fingerprint,
        }
    }

    /// Replicas in stable (configuration) order.
    pub fn replicas(&self) -> &[Arc<Replica>] {
        &self.replicas
    }

    /// Identity hash of the membership (ids and weights).
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Find a replica by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Replica>> {
        self.replicas.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_roundtrip_and_clamp() {
        let replica = Replica::new("r1", "q.r1", 1);
        assert_eq!(replica.load(), 0.0);

        replica.set_load(42.5);
        assert_eq!(replica.load(), 42.5);

        replica.set_load(-3.0);
        assert_eq!(replica.load(), 0.0);
    }

    #[test]
    fn test_fingerprint_tracks_membership() {
        let a = ReplicaSet::new(vec![Arc::new(Replica::new("a", "q.a", 1))]);
        let b = ReplicaSet::new(vec![Arc::new(Replica::new("b", "q.b", 1))]);
        let a_again = ReplicaSet::new(vec![Arc::new(Replica::new("a", "q.a", 1))]);
        let a_reweighted = ReplicaSet::new(vec![Arc::new(Replica::new("a", "q.a", 2))]);

        assert_eq!(a.fingerprint(), a_again.fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), a_reweighted.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_load() {
        let replica = Arc::new(Replica::new("a", "q.a", 1));
        let set = ReplicaSet::new(vec![replica.clone()]);
        let before = set.fingerprint();
        replica.set_load(99.0);
        assert_eq!(before, ReplicaSet::new(vec![replica]).fingerprint());
    }
}
