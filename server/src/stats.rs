//! Rolling validation counters and the recent-decision diagnostics ring
//!
//! Purely observational state: a bounded ring of the most recent validation
//! decisions for anti-cheat review, plus accept/reject counters over a
//! one-second window that the engine rolls from its tick.

use crate::validation::HitClaim;
use shared::Vec3;
use std::collections::VecDeque;

/// One validation decision, kept for observability only.
#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub claim: HitClaim,
    pub resolved_position: Vec3,
    pub rewind_timestamp: f64,
    pub accepted: bool,
    pub distance_error: f32,
}

/// Read-only stats snapshot exposed to operators and tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub total_players: usize,
    pub total_snapshots: usize,
    pub average_rtt: f64,
    pub validated_hits_last_second: u32,
    pub rejected_hits_last_second: u32,
    pub total_validations: u64,
}

/// Bounded decision ring plus the one-second accept/reject window.
pub struct Diagnostics {
    records: VecDeque<ValidationRecord>,
    capacity: usize,
    window_start: f64,
    accepted_in_window: u32,
    rejected_in_window: u32,
    total_validations: u64,
}

impl Diagnostics {
    pub fn new(capacity: usize, now: f64) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            window_start: now,
            accepted_in_window: 0,
            rejected_in_window: 0,
            total_validations: 0,
        }
    }

    /// Stores a decision, evicting the oldest record when at capacity.
    pub fn record_decision(&mut self, record: ValidationRecord) {
        if record.accepted {
            self.accepted_in_window += 1;
        } else {
            self.rejected_in_window += 1;
        }
        self.total_validations += 1;

        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Resets the per-second counters once a full second has elapsed.
    pub fn roll_window(&mut self, now: f64) {
        if now - self.window_start >= 1.0 {
            self.accepted_in_window = 0;
            self.rejected_in_window = 0;
            self.window_start = now;
        }
    }

    pub fn accepted_last_second(&self) -> u32 {
        self.accepted_in_window
    }

    pub fn rejected_last_second(&self) -> u32 {
        self.rejected_in_window
    }

    pub fn total_validations(&self) -> u64 {
        self.total_validations
    }

    /// Recent decisions, oldest first, most recent last.
    pub fn recent(&self) -> Vec<ValidationRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Empties the ring and zeroes every counter.
    pub fn reset(&mut self, now: f64) {
        self.records.clear();
        self.accepted_in_window = 0;
        self.rejected_in_window = 0;
        self.total_validations = 0;
        self.window_start = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(accepted: bool, shooter_id: u32) -> ValidationRecord {
        ValidationRecord {
            claim: HitClaim {
                shooter_id,
                target_id: 2,
                claimed_damage: 10.0,
                claimed_hit_position: Vec3::ZERO,
                client_timestamp: 0.0,
                server_receipt_timestamp: 0.0,
                weapon_id: 0,
            },
            resolved_position: Vec3::ZERO,
            rewind_timestamp: 0.0,
            accepted,
            distance_error: 0.0,
        }
    }

    #[test]
    fn test_counters_split_by_decision() {
        let mut diagnostics = Diagnostics::new(8, 0.0);
        diagnostics.record_decision(record(true, 1));
        diagnostics.record_decision(record(true, 1));
        diagnostics.record_decision(record(false, 1));

        assert_eq!(diagnostics.accepted_last_second(), 2);
        assert_eq!(diagnostics.rejected_last_second(), 1);
        assert_eq!(diagnostics.total_validations(), 3);
    }

    #[test]
    fn test_window_rolls_after_one_second() {
        let mut diagnostics = Diagnostics::new(8, 0.0);
        diagnostics.record_decision(record(true, 1));

        diagnostics.roll_window(0.5);
        assert_eq!(diagnostics.accepted_last_second(), 1);

        diagnostics.roll_window(1.2);
        assert_eq!(diagnostics.accepted_last_second(), 0);
        assert_eq!(diagnostics.rejected_last_second(), 0);

        // Totals survive window rolls
        assert_eq!(diagnostics.total_validations(), 1);
    }

    #[test]
    fn test_ring_bounded_oldest_evicted() {
        let capacity = 4;
        let mut diagnostics = Diagnostics::new(capacity, 0.0);

        for i in 0..10 {
            diagnostics.record_decision(record(true, i));
        }

        assert_eq!(diagnostics.len(), capacity);

        // Most recent last, oldest (ids 0..=5) evicted
        let recent = diagnostics.recent();
        assert_eq!(recent.first().unwrap().claim.shooter_id, 6);
        assert_eq!(recent.last().unwrap().claim.shooter_id, 9);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut diagnostics = Diagnostics::new(8, 0.0);
        diagnostics.record_decision(record(true, 1));
        diagnostics.record_decision(record(false, 2));

        diagnostics.reset(5.0);

        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.accepted_last_second(), 0);
        assert_eq!(diagnostics.rejected_last_second(), 0);
        assert_eq!(diagnostics.total_validations(), 0);
    }
}
