//! Temporal pose reconstruction from recorded history
//!
//! Given an entity and an arbitrary past timestamp, rebuilds the pose the
//! server believed the entity held at that moment: linear interpolation for
//! position and velocity, slerp for rotation, clamped to the nearest edge
//! when the timestamp falls outside the retained window. Clamping instead of
//! extrapolating means a claim can never be resolved against a position the
//! target was not actually observed to occupy.

use crate::history::{Snapshot, StateHistoryStore};
use shared::{Quat, Vec3};

/// Reconstructed entity pose at a specific point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

impl From<&Snapshot> for Pose {
    fn from(snapshot: &Snapshot) -> Self {
        Pose {
            position: snapshot.position,
            rotation: snapshot.rotation,
            velocity: snapshot.velocity,
        }
    }
}

/// Rebuilds the pose of `entity_id` at `timestamp` from stored history.
///
/// Returns None when the entity has no recorded history at all. Pure
/// function of the store contents, no side effects.
pub fn reconstruct(store: &StateHistoryStore, entity_id: u32, timestamp: f64) -> Option<Pose> {
    let history = store.history(entity_id)?;
    let (older, newer) = history.bracketing(timestamp)?;

    let span = newer.timestamp - older.timestamp;
    if span <= 0.0 {
        // Clamp case or two samples on the same tick
        return Some(Pose::from(older));
    }

    let t = ((timestamp - older.timestamp) / span).clamp(0.0, 1.0) as f32;
    Some(Pose {
        position: older.position.lerp(newer.position, t),
        rotation: older.rotation.slerp(newer.rotation, t),
        velocity: older.velocity.lerp(newer.velocity, t),
    })
}
