//! Server-authoritative hit validation with lag compensation
//!
//! The orchestrator over history, interpolation, RTT tracking and
//! diagnostics. For each claim it rewinds the server clock by the shooter's
//! estimated one-way latency, reconstructs where the target was at that
//! moment, and accepts the claim only if the claimed hit point lies within
//! the tolerance radius of that reconstructed position.
//!
//! Degraded situations never raise errors on this path: missing history or
//! missing RTT data fall back to checking against the target's newest
//! recorded pose, and a target the server has never observed validates
//! permissively. Availability is deliberately favored over strict rejection
//! when bookkeeping data is absent; the kill switch
//! ([`LagCompensator::set_enabled`]) is the operational escape hatch.

use crate::history::StateHistoryStore;
use crate::interpolation::{self, Pose};
use crate::rtt::RttTracker;
use crate::stats::{Diagnostics, EngineStats, ValidationRecord};
use log::{debug, info};
use shared::{
    Quat, Vec3, DIAGNOSTICS_CAPACITY, FALLBACK_RTT, HITBOX_RADIUS, HIT_TOLERANCE_SLACK,
    INTERPOLATION_DELAY, RTT_SMOOTHING_ALPHA, SNAPSHOT_CAPACITY,
};
use thiserror::Error;

/// Rejected configurations abort engine construction; nothing here is
/// recoverable at runtime.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("history capacity must be nonzero")]
    ZeroHistoryCapacity,
    #[error("diagnostics capacity must be nonzero")]
    ZeroDiagnosticsCapacity,
    #[error("tolerance radius must be positive and finite, got {0}")]
    InvalidToleranceRadius(f32),
    #[error("rtt smoothing alpha must be in (0, 1], got {0}")]
    InvalidRttAlpha(f64),
    #[error("interpolation delay must be non-negative, got {0}")]
    NegativeInterpolationDelay(f64),
    #[error("fallback rtt must be non-negative, got {0}")]
    NegativeFallbackRtt(f64),
}

/// Engine tuning, validated once at construction.
#[derive(Debug, Clone, Copy)]
pub struct LagCompensationConfig {
    /// Snapshots retained per entity.
    pub history_capacity: usize,
    /// Validation decisions retained for review.
    pub diagnostics_capacity: usize,
    /// Maximum distance between claimed and reconstructed position.
    pub tolerance_radius: f32,
    /// Fixed allowance for client-side view interpolation, seconds.
    pub interpolation_delay: f64,
    /// EMA coefficient for RTT smoothing.
    pub rtt_alpha: f64,
    /// RTT assumed for participants with no samples yet, seconds.
    pub fallback_rtt: f64,
    /// Start with compensation enabled.
    pub enabled: bool,
}

impl Default for LagCompensationConfig {
    fn default() -> Self {
        Self {
            history_capacity: SNAPSHOT_CAPACITY,
            diagnostics_capacity: DIAGNOSTICS_CAPACITY,
            tolerance_radius: HITBOX_RADIUS + HIT_TOLERANCE_SLACK,
            interpolation_delay: INTERPOLATION_DELAY,
            rtt_alpha: RTT_SMOOTHING_ALPHA,
            fallback_rtt: FALLBACK_RTT,
            enabled: true,
        }
    }
}

impl LagCompensationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.diagnostics_capacity == 0 {
            return Err(ConfigError::ZeroDiagnosticsCapacity);
        }
        if !self.tolerance_radius.is_finite() || self.tolerance_radius <= 0.0 {
            return Err(ConfigError::InvalidToleranceRadius(self.tolerance_radius));
        }
        if !self.rtt_alpha.is_finite() || self.rtt_alpha <= 0.0 || self.rtt_alpha > 1.0 {
            return Err(ConfigError::InvalidRttAlpha(self.rtt_alpha));
        }
        if !self.interpolation_delay.is_finite() || self.interpolation_delay < 0.0 {
            return Err(ConfigError::NegativeInterpolationDelay(
                self.interpolation_delay,
            ));
        }
        if !self.fallback_rtt.is_finite() || self.fallback_rtt < 0.0 {
            return Err(ConfigError::NegativeFallbackRtt(self.fallback_rtt));
        }
        Ok(())
    }
}

/// A client's assertion that a shot landed. Transient; only the diagnostics
/// ring holds on to it after validation.
#[derive(Debug, Clone)]
pub struct HitClaim {
    pub shooter_id: u32,
    pub target_id: u32,
    pub claimed_damage: f32,
    pub claimed_hit_position: Vec3,
    /// Client-reported send time. Diagnostics only; never used for ordering
    /// or rewind math.
    pub client_timestamp: f64,
    /// Monotonic server clock at claim receipt.
    pub server_receipt_timestamp: f64,
    pub weapon_id: u16,
}

/// Outcome of validating one claim.
#[derive(Debug, Clone, Copy)]
pub struct HitVerdict {
    pub accepted: bool,
    /// Server-authoritative target position the claim was checked against,
    /// or the claimed position itself when no data existed.
    pub resolved_position: Vec3,
    pub rewind_timestamp: f64,
    pub distance_error: f32,
}

/// The lag compensation engine. One instance per server session, owned by
/// the simulation loop; every entry point is synchronous and allocation-light.
pub struct LagCompensator {
    store: StateHistoryStore,
    rtt: RttTracker,
    diagnostics: Diagnostics,
    tolerance_radius: f32,
    interpolation_delay: f64,
    enabled: bool,
}

impl LagCompensator {
    pub fn new(config: LagCompensationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        info!(
            "Lag compensation engine ready: capacity {}, tolerance {:.2}, delay {:.0}ms, enabled {}",
            config.history_capacity,
            config.tolerance_radius,
            config.interpolation_delay * 1000.0,
            config.enabled
        );

        Ok(Self {
            store: StateHistoryStore::new(config.history_capacity),
            rtt: RttTracker::new(config.rtt_alpha, config.fallback_rtt),
            diagnostics: Diagnostics::new(config.diagnostics_capacity, 0.0),
            tolerance_radius: config.tolerance_radius,
            interpolation_delay: config.interpolation_delay,
            enabled: config.enabled,
        })
    }

    /// Records one entity's pose for the current tick. Fire-and-forget:
    /// out-of-order samples are dropped inside the store.
    pub fn record_state(
        &mut self,
        entity_id: u32,
        position: Vec3,
        rotation: Quat,
        velocity: Vec3,
        timestamp: f64,
    ) {
        self.store
            .record_state(entity_id, position, rotation, velocity, timestamp);
    }

    /// Drops all history for a despawned or disconnected entity.
    pub fn remove_entity(&mut self, entity_id: u32) {
        self.store.remove(&entity_id);
    }

    /// Feeds a transport-level RTT sample for a participant.
    pub fn update_rtt(&mut self, participant_id: u32, sample_seconds: f64, now: f64) {
        self.rtt.update(participant_id, sample_seconds, now);
    }

    /// Forgets a disconnected participant's RTT estimate.
    pub fn remove_participant(&mut self, participant_id: u32) {
        self.rtt.remove(&participant_id);
    }

    pub fn rtt(&self, participant_id: u32) -> f64 {
        self.rtt.get(participant_id)
    }

    /// Builds a claim stamped with the current server receipt time.
    #[allow(clippy::too_many_arguments)]
    pub fn create_hit_request(
        &self,
        shooter_id: u32,
        target_id: u32,
        damage: f32,
        claimed_hit_position: Vec3,
        weapon_id: u16,
        client_timestamp: f64,
        now: f64,
    ) -> HitClaim {
        HitClaim {
            shooter_id,
            target_id,
            claimed_damage: damage,
            claimed_hit_position,
            client_timestamp,
            server_receipt_timestamp: now,
            weapon_id,
        }
    }

    /// Validates a hit claim against reconstructed history.
    ///
    /// Claims must be fed in server-receipt order; the engine never reorders
    /// them by client timestamp. Range and line-of-sight checks are the
    /// caller's responsibility on top of this accept/reject.
    pub fn validate_hit(&mut self, claim: &HitClaim) -> HitVerdict {
        let rewind_timestamp = (claim.server_receipt_timestamp
            - self.rtt.get(claim.shooter_id) / 2.0
            - self.interpolation_delay)
            .max(0.0);

        let reconstructed = if self.enabled {
            interpolation::reconstruct(&self.store, claim.target_id, rewind_timestamp)
        } else {
            None
        };

        // Direct validation against the newest recorded pose when rewind is
        // impossible or compensation is switched off
        let pose = reconstructed.or_else(|| self.live_pose(claim.target_id));

        let verdict = match pose {
            Some(pose) => {
                let distance_error = pose.position.distance(claim.claimed_hit_position);
                HitVerdict {
                    accepted: distance_error <= self.tolerance_radius,
                    resolved_position: pose.position,
                    rewind_timestamp,
                    distance_error,
                }
            }
            None => {
                debug!(
                    "No pose data for target {}, accepting claim from {} at face value",
                    claim.target_id, claim.shooter_id
                );
                HitVerdict {
                    accepted: true,
                    resolved_position: claim.claimed_hit_position,
                    rewind_timestamp,
                    distance_error: 0.0,
                }
            }
        };

        if verdict.accepted {
            debug!(
                "Accepted hit {} -> {} ({:.2} units off at t={:.3})",
                claim.shooter_id, claim.target_id, verdict.distance_error, rewind_timestamp
            );
        } else {
            info!(
                "Rejected hit {} -> {}: {:.2} units from reconstructed position at t={:.3}",
                claim.shooter_id, claim.target_id, verdict.distance_error, rewind_timestamp
            );
        }

        self.diagnostics.record_decision(ValidationRecord {
            claim: claim.clone(),
            resolved_position: verdict.resolved_position,
            rewind_timestamp,
            accepted: verdict.accepted,
            distance_error: verdict.distance_error,
        });

        verdict
    }

    /// Per-tick maintenance: rolls the one-second statistics window.
    pub fn tick(&mut self, now: f64) {
        self.diagnostics.roll_window(now);
    }

    /// Kill switch. Disabled, every claim validates against the target's
    /// newest recorded pose instead of rewound history.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(
                "Lag compensation {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ops/test hook: empties all histories and resets counters without
    /// restarting the process. RTT estimates survive, they belong to live
    /// connections.
    pub fn clear_history(&mut self, now: f64) {
        self.store.clear();
        self.diagnostics.reset(now);
        info!("Cleared all entity histories and diagnostics");
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_players: self.store.entity_count(),
            total_snapshots: self.store.snapshot_count(),
            average_rtt: self.rtt.average(),
            validated_hits_last_second: self.diagnostics.accepted_last_second(),
            rejected_hits_last_second: self.diagnostics.rejected_last_second(),
            total_validations: self.diagnostics.total_validations(),
        }
    }

    /// Recent validation decisions, most recent last.
    pub fn recent_requests(&self) -> Vec<ValidationRecord> {
        self.diagnostics.recent()
    }

    fn live_pose(&self, entity_id: u32) -> Option<Pose> {
        self.store
            .history(entity_id)
            .and_then(|history| history.newest())
            .map(Pose::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LagCompensator {
        LagCompensator::new(LagCompensationConfig::default()).unwrap()
    }

    fn engine_with_tolerance(tolerance_radius: f32) -> LagCompensator {
        LagCompensator::new(LagCompensationConfig {
            tolerance_radius,
            ..LagCompensationConfig::default()
        })
        .unwrap()
    }

    fn record_line(engine: &mut LagCompensator, entity_id: u32) {
        engine.record_state(
            entity_id,
            Vec3::new(0.0, 0.0, 0.0),
            Quat::IDENTITY,
            Vec3::ZERO,
            0.0,
        );
        engine.record_state(
            entity_id,
            Vec3::new(10.0, 0.0, 0.0),
            Quat::IDENTITY,
            Vec3::ZERO,
            0.1,
        );
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let config = LagCompensationConfig {
            history_capacity: 0,
            ..LagCompensationConfig::default()
        };
        assert_eq!(
            LagCompensator::new(config).err(),
            Some(ConfigError::ZeroHistoryCapacity)
        );
    }

    #[test]
    fn test_config_rejects_bad_tolerance() {
        let config = LagCompensationConfig {
            tolerance_radius: 0.0,
            ..LagCompensationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidToleranceRadius(_))
        ));
    }

    #[test]
    fn test_config_rejects_bad_alpha() {
        for alpha in [0.0, -0.5, 1.5, f64::NAN] {
            let config = LagCompensationConfig {
                rtt_alpha: alpha,
                ..LagCompensationConfig::default()
            };
            assert!(config.validate().is_err(), "alpha {} should fail", alpha);
        }
    }

    #[test]
    fn test_valid_hit_accepted() {
        let mut engine = engine();
        record_line(&mut engine, 2);
        engine.update_rtt(1, 0.1, 0.1);

        // Rewind lands at 0.15 - 0.05 - delay, just before the newest sample
        let claim = engine.create_hit_request(1, 2, 20.0, Vec3::new(9.0, 0.0, 0.0), 1, 0.1, 0.15);
        let verdict = engine.validate_hit(&claim);

        assert!(verdict.accepted);
        assert!(verdict.distance_error <= engine.tolerance_radius);
    }

    #[test]
    fn test_distant_hit_rejected() {
        let mut engine = engine();
        record_line(&mut engine, 2);
        engine.update_rtt(1, 0.1, 0.1);

        let claim =
            engine.create_hit_request(1, 2, 20.0, Vec3::new(100.0, 0.0, 0.0), 1, 0.1, 0.15);
        let verdict = engine.validate_hit(&claim);

        assert!(!verdict.accepted);
        assert!(verdict.distance_error > 50.0);
    }

    #[test]
    fn test_rewind_timestamp_never_negative() {
        let mut engine = engine();
        record_line(&mut engine, 2);

        let claim = engine.create_hit_request(1, 2, 20.0, Vec3::ZERO, 1, 0.0, 0.01);
        let verdict = engine.validate_hit(&claim);
        assert!(verdict.rewind_timestamp >= 0.0);
    }

    #[test]
    fn test_unknown_target_accepted_permissively() {
        let mut engine = engine();
        let claim =
            engine.create_hit_request(1, 99, 20.0, Vec3::new(5.0, 0.0, 0.0), 1, 0.0, 1.0);
        let verdict = engine.validate_hit(&claim);

        assert!(verdict.accepted);
        assert_eq!(verdict.resolved_position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(verdict.distance_error, 0.0);
    }

    #[test]
    fn test_unknown_shooter_uses_fallback_rtt() {
        let mut engine = engine();
        record_line(&mut engine, 2);

        // No RTT sample for shooter 1: rewind uses the fallback half-RTT
        let claim = engine.create_hit_request(1, 2, 20.0, Vec3::new(10.0, 0.0, 0.0), 1, 0.0, 1.0);
        let verdict = engine.validate_hit(&claim);

        assert!((verdict.rewind_timestamp - (1.0 - 0.05 - INTERPOLATION_DELAY)).abs() < 1e-9);
        assert!(verdict.accepted);
    }

    #[test]
    fn test_kill_switch_validates_against_live_pose() {
        let mut engine = engine();
        record_line(&mut engine, 2);
        engine.update_rtt(1, 0.2, 0.1);

        // Claim matches the newest (live) pose but not the rewound one
        let live_position = Vec3::new(10.0, 0.0, 0.0);
        let claim = engine.create_hit_request(1, 2, 20.0, live_position, 1, 0.1, 0.1);

        engine.set_enabled(false);
        assert!(!engine.is_enabled());
        let direct = engine.validate_hit(&claim);
        assert!(direct.accepted);

        engine.set_enabled(true);
        let compensated = engine.validate_hit(&claim);
        // Rewound position is near the start of the motion, 10 units away
        assert!(!compensated.accepted);
    }

    #[test]
    fn test_diagnostics_ring_bounded() {
        let capacity = 8;
        let mut engine = LagCompensator::new(LagCompensationConfig {
            diagnostics_capacity: capacity,
            ..LagCompensationConfig::default()
        })
        .unwrap();
        record_line(&mut engine, 2);

        for i in 0..capacity * 3 {
            let claim = engine.create_hit_request(1, 2, 1.0, Vec3::ZERO, 1, 0.0, 0.2 + i as f64);
            engine.validate_hit(&claim);
        }

        assert_eq!(engine.recent_requests().len(), capacity);
    }

    #[test]
    fn test_stats_reflect_decisions() {
        let mut engine = engine();
        record_line(&mut engine, 2);
        engine.update_rtt(1, 0.1, 0.1);

        let good = engine.create_hit_request(1, 2, 1.0, Vec3::new(10.0, 0.0, 0.0), 1, 0.1, 0.2);
        let bad = engine.create_hit_request(1, 2, 1.0, Vec3::new(90.0, 0.0, 0.0), 1, 0.1, 0.2);
        engine.validate_hit(&good);
        engine.validate_hit(&bad);

        let stats = engine.stats();
        assert_eq!(stats.total_players, 1);
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(stats.validated_hits_last_second, 1);
        assert_eq!(stats.rejected_hits_last_second, 1);
        assert_eq!(stats.total_validations, 2);
        assert!(stats.average_rtt > 0.0);
    }

    #[test]
    fn test_tick_rolls_stats_window() {
        let mut engine = engine();
        record_line(&mut engine, 2);

        let claim = engine.create_hit_request(1, 2, 1.0, Vec3::new(10.0, 0.0, 0.0), 1, 0.1, 0.2);
        engine.validate_hit(&claim);
        assert_eq!(engine.stats().validated_hits_last_second, 1);

        engine.tick(0.5);
        assert_eq!(engine.stats().validated_hits_last_second, 1);

        engine.tick(1.5);
        assert_eq!(engine.stats().validated_hits_last_second, 0);
        assert_eq!(engine.stats().total_validations, 1);
    }

    #[test]
    fn test_clear_history_keeps_rtt() {
        let mut engine = engine();
        record_line(&mut engine, 2);
        engine.update_rtt(1, 0.08, 0.1);

        let claim = engine.create_hit_request(1, 2, 1.0, Vec3::ZERO, 1, 0.0, 0.2);
        engine.validate_hit(&claim);

        engine.clear_history(1.0);

        let stats = engine.stats();
        assert_eq!(stats.total_players, 0);
        assert_eq!(stats.total_snapshots, 0);
        assert_eq!(stats.total_validations, 0);
        assert!(engine.recent_requests().is_empty());
        assert!((engine.rtt(1) - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_remove_entity_and_participant() {
        let mut engine = engine();
        record_line(&mut engine, 2);
        engine.update_rtt(2, 0.08, 0.1);

        engine.remove_entity(2);
        engine.remove_participant(2);

        assert_eq!(engine.stats().total_players, 0);
        assert_eq!(engine.stats().average_rtt, 0.0);
    }

    #[test]
    fn test_tolerance_boundary_branches() {
        // End-to-end scenario: rewind resolves 4 units from the claim;
        // generous tolerance accepts, tight tolerance rejects
        for (tolerance, expect_accept) in [(4.5, true), (3.5, false)] {
            let mut engine = engine_with_tolerance(tolerance);
            record_line(&mut engine, 2);
            engine.update_rtt(1, 0.1, 0.1);

            let claim =
                engine.create_hit_request(1, 2, 1.0, Vec3::new(5.0, 0.0, 0.0), 1, 0.1, 0.15);
            let verdict = engine.validate_hit(&claim);
            assert_eq!(
                verdict.accepted, expect_accept,
                "tolerance {} should accept={}",
                tolerance, expect_accept
            );
        }
    }
}
