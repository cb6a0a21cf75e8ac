//! Smoothed per-participant round-trip-time estimates
//!
//! Raw RTT samples jitter; feeding them straight into the rewind calculation
//! would make hit acceptance flap under identical network conditions. Each
//! participant therefore carries an exponentially smoothed estimate, and
//! participants with no samples yet fall back to a conservative default.

use log::warn;
use std::collections::HashMap;

/// Smoothed RTT for one participant.
#[derive(Debug, Clone, Copy)]
pub struct RttEstimate {
    /// Smoothed round-trip time in seconds.
    pub smoothed: f64,
    /// Server-clock time of the most recent sample.
    pub last_update: f64,
}

/// Tracks a smoothed RTT estimate per remote participant.
pub struct RttTracker {
    estimates: HashMap<u32, RttEstimate>,
    alpha: f64,
    fallback: f64,
}

impl RttTracker {
    pub fn new(alpha: f64, fallback: f64) -> Self {
        Self {
            estimates: HashMap::new(),
            alpha,
            fallback,
        }
    }

    /// Folds a new RTT sample into the participant's estimate.
    ///
    /// The first sample initializes the estimate directly; later samples
    /// move it by `alpha` of the difference. Non-finite or negative samples
    /// are discarded.
    pub fn update(&mut self, participant_id: u32, sample: f64, now: f64) {
        if !sample.is_finite() || sample < 0.0 {
            warn!(
                "Ignoring invalid RTT sample {} for participant {}",
                sample, participant_id
            );
            return;
        }

        match self.estimates.get_mut(&participant_id) {
            Some(estimate) => {
                estimate.smoothed = estimate.smoothed * (1.0 - self.alpha) + sample * self.alpha;
                estimate.last_update = now;
            }
            None => {
                self.estimates.insert(
                    participant_id,
                    RttEstimate {
                        smoothed: sample,
                        last_update: now,
                    },
                );
            }
        }
    }

    /// The participant's smoothed RTT, or the conservative fallback when no
    /// sample has been observed yet.
    pub fn get(&self, participant_id: u32) -> f64 {
        self.estimates
            .get(&participant_id)
            .map(|e| e.smoothed)
            .unwrap_or(self.fallback)
    }

    /// Mean smoothed RTT across tracked participants, 0 when none.
    pub fn average(&self) -> f64 {
        if self.estimates.is_empty() {
            return 0.0;
        }
        let total: f64 = self.estimates.values().map(|e| e.smoothed).sum();
        total / self.estimates.len() as f64
    }

    pub fn remove(&mut self, participant_id: &u32) -> bool {
        self.estimates.remove(participant_id).is_some()
    }

    pub fn tracked_count(&self) -> usize {
        self.estimates.len()
    }

    pub fn clear(&mut self) {
        self.estimates.clear();
    }
}
