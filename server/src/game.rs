//! Live authoritative world state hosted by the server
//!
//! Holds the current pose of every connected player and integrates movement
//! inputs each tick. This is the source feeding per-tick snapshot recording
//! into the lag compensation engine, and the broadcast payload clients
//! render from.

use log::info;
use rand::Rng;
use shared::{InputState, PlayerPose, Quat, Vec3, PLAYER_SPEED, WORLD_EXTENT};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct PlayerState {
    pub id: u32,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

#[derive(Debug, Default)]
pub struct World {
    pub tick: u32,
    pub players: HashMap<u32, PlayerState>,
}

impl World {
    pub fn new() -> Self {
        Self {
            tick: 0,
            players: HashMap::new(),
        }
    }

    /// Spawns a player at a random position on the ground plane.
    pub fn add_player(&mut self, client_id: u32) {
        let mut rng = rand::thread_rng();
        let half = WORLD_EXTENT / 2.0;
        let spawn = Vec3::new(rng.gen_range(-half..half), 0.0, rng.gen_range(-half..half));

        info!(
            "Spawned player {} at ({:.1}, {:.1}, {:.1})",
            client_id, spawn.x, spawn.y, spawn.z
        );
        self.players.insert(
            client_id,
            PlayerState {
                id: client_id,
                position: spawn,
                rotation: Quat::IDENTITY,
                velocity: Vec3::ZERO,
            },
        );
    }

    pub fn remove_player(&mut self, client_id: &u32) {
        if self.players.remove(client_id).is_some() {
            info!("Removed player {}", client_id);
        }
    }

    /// Applies a movement input: sets velocity and turns the player to face
    /// the direction of travel. Zero input stops the player in place.
    pub fn apply_input(&mut self, client_id: u32, input: &InputState) {
        if let Some(player) = self.players.get_mut(&client_id) {
            let direction = Vec3::new(input.move_x, 0.0, input.move_z).normalize();
            player.velocity = direction.scale(PLAYER_SPEED);

            if direction.length() > 0.0 {
                player.rotation = Quat::from_yaw(direction.x.atan2(direction.z));
            }
        }
    }

    /// Integrates velocities over `dt` and clamps players to world bounds.
    pub fn update(&mut self, dt: f32) {
        for player in self.players.values_mut() {
            player.position = player.position.add(player.velocity.scale(dt));
            player.position.x = player.position.x.clamp(-WORLD_EXTENT, WORLD_EXTENT);
            player.position.z = player.position.z.clamp(-WORLD_EXTENT, WORLD_EXTENT);
        }
    }

    /// Current poses for broadcast and snapshot recording.
    pub fn poses(&self) -> Vec<PlayerPose> {
        self.players
            .values()
            .map(|p| PlayerPose {
                id: p.id,
                position: p.position,
                rotation: p.rotation,
                velocity: p.velocity,
            })
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn input(move_x: f32, move_z: f32) -> InputState {
        InputState {
            sequence: 1,
            timestamp: 0,
            move_x,
            move_z,
        }
    }

    #[test]
    fn test_add_and_remove_player() {
        let mut world = World::new();
        world.add_player(1);
        assert_eq!(world.player_count(), 1);

        let spawn = world.players.get(&1).unwrap().position;
        assert!(spawn.x.abs() <= WORLD_EXTENT / 2.0);
        assert!(spawn.z.abs() <= WORLD_EXTENT / 2.0);

        world.remove_player(&1);
        assert_eq!(world.player_count(), 0);
    }

    #[test]
    fn test_apply_input_sets_velocity_and_facing() {
        let mut world = World::new();
        world.add_player(1);

        world.apply_input(1, &input(1.0, 0.0));
        let player = world.players.get(&1).unwrap();
        assert_approx_eq!(player.velocity.x, PLAYER_SPEED, 1e-4);
        assert_approx_eq!(player.velocity.z, 0.0, 1e-4);

        let expected = Quat::from_yaw(std::f32::consts::FRAC_PI_2);
        assert_approx_eq!(player.rotation.dot(expected).abs(), 1.0, 1e-5);
    }

    #[test]
    fn test_diagonal_input_normalized() {
        let mut world = World::new();
        world.add_player(1);

        world.apply_input(1, &input(1.0, 1.0));
        let speed = world.players.get(&1).unwrap().velocity.length();
        assert_approx_eq!(speed, PLAYER_SPEED, 1e-4);
    }

    #[test]
    fn test_zero_input_stops_without_turning() {
        let mut world = World::new();
        world.add_player(1);

        world.apply_input(1, &input(1.0, 0.0));
        let facing = world.players.get(&1).unwrap().rotation;

        world.apply_input(1, &input(0.0, 0.0));
        let player = world.players.get(&1).unwrap();
        assert_eq!(player.velocity, Vec3::ZERO);
        assert_eq!(player.rotation, facing);
    }

    #[test]
    fn test_update_integrates_velocity() {
        let mut world = World::new();
        world.add_player(1);
        world.apply_input(1, &input(0.0, 1.0));

        let before = world.players.get(&1).unwrap().position;
        world.update(0.5);
        let after = world.players.get(&1).unwrap().position;

        assert_approx_eq!(after.z - before.z, PLAYER_SPEED * 0.5, 1e-3);
    }

    #[test]
    fn test_update_clamps_to_world_bounds() {
        let mut world = World::new();
        world.add_player(1);

        let player = world.players.get_mut(&1).unwrap();
        player.position = Vec3::new(WORLD_EXTENT, 0.0, 0.0);
        player.velocity = Vec3::new(PLAYER_SPEED, 0.0, 0.0);

        world.update(10.0);
        assert_eq!(world.players.get(&1).unwrap().position.x, WORLD_EXTENT);
    }

    #[test]
    fn test_apply_input_unknown_player_is_noop() {
        let mut world = World::new();
        world.apply_input(99, &input(1.0, 0.0));
        assert_eq!(world.player_count(), 0);
    }

    #[test]
    fn test_poses_reflect_players() {
        let mut world = World::new();
        world.add_player(1);
        world.add_player(2);

        let poses = world.poses();
        assert_eq!(poses.len(), 2);
        let mut ids: Vec<u32> = poses.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}
