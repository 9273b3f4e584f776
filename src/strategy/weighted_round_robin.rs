//! Weighted round-robin selection.
//!
//! Distributes messages proportionally to configured weight, ignoring load
//! and key. Picks interleave across the cycle rather than bursting: a
//! replica is only selected twice in a row when its weight exceeds half
//! the cycle total.

use std::cmp::Reverse;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{SelectError, SelectionStrategy};
use crate::registry::{Replica, ReplicaSet};

/// Per-replica remaining-weight counters plus the previous pick.
///
/// Each selection consumes one unit of the heaviest-remaining replica that
/// is not the previous pick; the previous pick is only eligible again when
/// nothing else has weight left. Counters refill from the weights once a
/// full cycle of `sum(weights)` picks completes, while the previous pick
/// carries across the refill, so the interleaving holds at the cycle
/// boundary too.
#[derive(Debug)]
struct Cursor {
    /// Fingerprint of the snapshot this state was built from.
    fingerprint: u64,
    remaining: Vec<u32>,
    last: Option<usize>,
}

impl Cursor {
    fn new(set: &ReplicaSet) -> Self {
        Self {
            fingerprint: set.fingerprint(),
            remaining: set.replicas().iter().map(|r| r.weight.max(1)).collect(),
            last: None,
        }
    }

    /// Pick the next replica index. `weights` must match the snapshot this
    /// cursor was built from. Returns `None` only for an empty set.
    fn advance(&mut self, weights: &[u32]) -> Option<usize> {
        if self.remaining.iter().all(|&r| r == 0) {
            for (slot, &weight) in self.remaining.iter_mut().zip(weights) {
                *slot = weight.max(1);
            }
        }

        let pick = self
            .remaining
            .iter()
            .enumerate()
            .filter(|&(idx, &r)| r > 0 && Some(idx) != self.last)
            .min_by_key(|&(idx, &r)| (Reverse(r), idx))
            .map(|(idx, _)| idx)
            .or_else(|| self.remaining.iter().position(|&r| r > 0))?;

        self.remaining[pick] -= 1;
        self.last = Some(pick);
        Some(pick)
    }
}

/// Weighted round-robin strategy.
///
/// Selection and counter mutation happen under one mutex acquisition, so
/// concurrent dispatches cannot double-consume or skip a slot.
pub struct WeightedRoundRobinStrategy {
    cursor: Mutex<Option<Cursor>>,
}

impl WeightedRoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(None),
        }
    }
}

impl Default for WeightedRoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for WeightedRoundRobinStrategy {
    fn select(&self, set: &ReplicaSet, _routing_key: &str) -> Result<Arc<Replica>, SelectError> {
        if set.is_empty() {
            return Err(SelectError::NoAvailableReplica);
        }

        let weights: Vec<u32> = set.replicas().iter().map(|r| r.weight.max(1)).collect();

        let mut guard = self.cursor.lock();
        if guard
            .as_ref()
            .map_or(true, |cursor| cursor.fingerprint != set.fingerprint())
        {
            *guard = Some(Cursor::new(set));
        }
        let cursor = guard.get_or_insert_with(|| Cursor::new(set));

        let idx = cursor
            .advance(&weights)
            .ok_or(SelectError::NoAvailableReplica)?;
        Ok(set.replicas()[idx].clone())
    }

    fn name(&self) -> &'static str {
        "WeightedRoundRobin"
    }
}
