//! Consistent-hash selection.
//!
//! Routes a device's messages to the same replica for as long as the
//! replica set is unchanged, and keeps reassignment bounded when the set
//! does change.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::{SelectError, SelectionStrategy};
use crate::registry::{Replica, ReplicaSet};

/// Consistent-hash strategy with a cached hash ring.
///
/// The ring maps hash positions to replica indices and carries
/// `virtual_nodes` positions per replica to smooth the distribution. It is
/// rebuilt from scratch when the snapshot fingerprint changes; in-flight
/// selections keep using the ring they already cloned.
pub struct ConsistentHashStrategy {
    virtual_nodes: u32,
    /// Cached ring keyed by the snapshot fingerprint it was built from.
    ring_cache: RwLock<Option<(u64, Arc<BTreeMap<u64, usize>>)>>,
}

impl ConsistentHashStrategy {
    pub fn new() -> Self {
        Self::with_virtual_nodes(100)
    }

    pub fn with_virtual_nodes(virtual_nodes: u32) -> Self {
        Self {
            virtual_nodes: virtual_nodes.max(1),
            ring_cache: RwLock::new(None),
        }
    }

    /// Hash a string key to a ring position.
    fn hash_key(key: &str) -> u64 {
        let hash = blake3::hash(key.as_bytes());
        let bytes = hash.as_bytes();
        u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    }

    /// Get or rebuild the ring for the given snapshot.
    fn get_or_build_ring(&self, set: &ReplicaSet) -> Arc<BTreeMap<u64, usize>> {
        let fingerprint = set.fingerprint();

        {
            let cache = self.ring_cache.read();
            if let Some((cached_fingerprint, ring)) = cache.as_ref() {
                if *cached_fingerprint == fingerprint {
                    return ring.clone();
                }
            }
        }

        let mut ring = BTreeMap::new();
        for (idx, replica) in set.replicas().iter().enumerate() {
            for vnode in 0..self.virtual_nodes {
                let position = Self::hash_key(&format!("{}:{}", replica.id, vnode));
                ring.insert(position, idx);
            }
        }
        let ring = Arc::new(ring);

        trace!(
            fingerprint,
            positions = ring.len(),
            "Hash ring rebuilt"
        );

        *self.ring_cache.write() = Some((fingerprint, ring.clone()));
        ring
    }

    /// First ring entry with position >= hash, wrapping to the smallest.
    fn find_in_ring(ring: &BTreeMap<u64, usize>, hash: u64) -> Option<usize> {
        if ring.is_empty() {
            return None;
        }

        ring.range(hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, &idx)| idx)
    }
}

impl Default for ConsistentHashStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for ConsistentHashStrategy {
    fn select(&self, set: &ReplicaSet, routing_key: &str) -> Result<Arc<Replica>, SelectError> {
        if set.is_empty() {
            return Err(SelectError::NoAvailableReplica);
        }

        if set.len() == 1 {
            return Ok(set.replicas()[0].clone());
        }

        let ring = self.get_or_build_ring(set);
        let hash = Self::hash_key(routing_key);

        trace!(routing_key = %routing_key, hash, "Consistent hash lookup");

        let idx = Self::find_in_ring(&ring, hash).ok_or(SelectError::NoAvailableReplica)?;
        Ok(set.replicas()[idx].clone())
    }

    fn name(&self) -> &'static str {
        "ConsistentHashing"
    }
}
