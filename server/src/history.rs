//! Per-entity pose history backing lag-compensated rewind lookups
//!
//! Every tracked entity owns a bounded ring of timestamped pose snapshots.
//! The ring keeps insertion O(1) and lookup O(log n) while putting a hard
//! ceiling on memory, so history survives the longest compensated RTT window
//! without growing over the lifetime of a match.

use log::{debug, info};
use shared::{Quat, Vec3};
use std::collections::{HashMap, VecDeque};

/// Immutable pose sample for one entity at one recorded server tick.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    /// Seconds on the monotonic server clock.
    pub timestamp: f64,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

/// Bounded, time-ascending snapshot ring for a single entity.
///
/// Invariant: timestamps are non-decreasing front to back. Samples that
/// arrive with a timestamp older than the newest retained one are dropped,
/// which keeps the invariant without a sort-on-insert pass.
#[derive(Debug)]
pub struct EntityHistory {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl EntityHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a snapshot, evicting the oldest entry when at capacity.
    ///
    /// Returns false if the sample was rejected for arriving out of order.
    pub fn record(&mut self, snapshot: Snapshot) -> bool {
        if let Some(newest) = self.snapshots.back() {
            if snapshot.timestamp < newest.timestamp {
                return false;
            }
        }

        if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
        true
    }

    /// The two snapshots bracketing `timestamp`.
    ///
    /// Timestamps outside the retained range clamp to the nearest edge (the
    /// same snapshot is returned twice); there is no extrapolation past the
    /// newest sample. Returns None only when the history is empty.
    pub fn bracketing(&self, timestamp: f64) -> Option<(&Snapshot, &Snapshot)> {
        let oldest = self.snapshots.front()?;
        let newest = self.snapshots.back()?;

        if timestamp <= oldest.timestamp {
            return Some((oldest, oldest));
        }
        if timestamp >= newest.timestamp {
            return Some((newest, newest));
        }

        // Strictly inside the range, so both indices are valid
        let upper = self.snapshots.partition_point(|s| s.timestamp <= timestamp);
        Some((&self.snapshots[upper - 1], &self.snapshots[upper]))
    }

    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Owns one [`EntityHistory`] per tracked entity.
///
/// Histories are created lazily on the first recorded sample and removed
/// explicitly on despawn/disconnect, so the tracked set always matches the
/// live participant set and total memory stays bounded by
/// `capacity * entity_count`.
pub struct StateHistoryStore {
    histories: HashMap<u32, EntityHistory>,
    capacity: usize,
}

impl StateHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            histories: HashMap::new(),
            capacity,
        }
    }

    /// Records a pose sample, creating the entity's history on first sight.
    pub fn record_state(
        &mut self,
        entity_id: u32,
        position: Vec3,
        rotation: Quat,
        velocity: Vec3,
        timestamp: f64,
    ) {
        let capacity = self.capacity;
        let history = self
            .histories
            .entry(entity_id)
            .or_insert_with(|| EntityHistory::new(capacity));

        let recorded = history.record(Snapshot {
            timestamp,
            position,
            rotation,
            velocity,
        });

        if !recorded {
            debug!(
                "Dropped out-of-order snapshot for entity {} at t={:.3}",
                entity_id, timestamp
            );
        }
    }

    /// Drops an entity's history entirely. Returns false if it was unknown.
    pub fn remove(&mut self, entity_id: &u32) -> bool {
        if self.histories.remove(entity_id).is_some() {
            info!("Dropped pose history for entity {}", entity_id);
            true
        } else {
            false
        }
    }

    pub fn history(&self, entity_id: u32) -> Option<&EntityHistory> {
        self.histories.get(&entity_id)
    }

    /// Number of entities currently tracked.
    pub fn entity_count(&self) -> usize {
        self.histories.len()
    }

    /// Total snapshots retained across all entities.
    pub fn snapshot_count(&self) -> usize {
        self.histories.values().map(EntityHistory::len).sum()
    }

    pub fn clear(&mut self) {
        self.histories.clear();
    }
}
