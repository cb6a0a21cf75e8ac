use serde::{Deserialize, Serialize};

pub const WORLD_EXTENT: f32 = 200.0;
pub const PLAYER_SPEED: f32 = 12.0;
pub const HITBOX_RADIUS: f32 = 1.5;
pub const HIT_TOLERANCE_SLACK: f32 = 0.5;
pub const SNAPSHOT_CAPACITY: usize = 256;
pub const DIAGNOSTICS_CAPACITY: usize = 64;
pub const INTERPOLATION_DELAY: f64 = 0.01;
pub const RTT_SMOOTHING_ALPHA: f64 = 0.15;
pub const FALLBACK_RTT: f64 = 0.1;

/// Position or direction in 3D world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        if len == 0.0 {
            Vec3::ZERO
        } else {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        }
    }

    pub fn scale(self, scalar: f32) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Linear interpolation between two points, `t` in [0, 1].
    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }
}

/// Orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `angle` radians around the world up axis.
    pub fn from_yaw(angle: f32) -> Self {
        let half = angle * 0.5;
        Quat {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        }
    }

    pub fn dot(self, other: Quat) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn normalize(self) -> Quat {
        let len = self.dot(self).sqrt();
        if len == 0.0 {
            Quat::IDENTITY
        } else {
            Quat {
                x: self.x / len,
                y: self.y / len,
                z: self.z / len,
                w: self.w / len,
            }
        }
    }

    /// Spherical interpolation along the shortest arc, `t` in [0, 1].
    ///
    /// Falls back to normalized linear interpolation when the inputs are
    /// nearly parallel, where the slerp denominator loses precision.
    pub fn slerp(self, other: Quat, t: f32) -> Quat {
        let mut cos_theta = self.dot(other);
        let mut end = other;

        // Take the shortest arc
        if cos_theta < 0.0 {
            cos_theta = -cos_theta;
            end = Quat {
                x: -other.x,
                y: -other.y,
                z: -other.z,
                w: -other.w,
            };
        }

        if cos_theta > 0.9995 {
            return Quat {
                x: self.x + (end.x - self.x) * t,
                y: self.y + (end.y - self.y) * t,
                z: self.z + (end.z - self.z) * t,
                w: self.w + (end.w - self.w) * t,
            }
            .normalize();
        }

        let theta = cos_theta.clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;

        Quat {
            x: self.x * a + end.x * b,
            y: self.y * a + end.y * b,
            z: self.z * a + end.z * b,
            w: self.w * a + end.w * b,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        move_x: f32,
        move_z: f32,
    },
    Heartbeat {
        timestamp: u64,
    },
    HeartbeatAck {
        timestamp: u64,
    },
    HitClaim {
        target_id: u32,
        damage: f32,
        hit_position: Vec3,
        client_timestamp: f64,
        weapon_id: u16,
    },
    Disconnect,

    Connected {
        client_id: u32,
    },
    HitResult {
        target_id: u32,
        accepted: bool,
        resolved_position: Vec3,
    },
    GameState {
        tick: u32,
        timestamp: f64,
        players: Vec<PlayerPose>,
    },
    Disconnected {
        reason: String,
    },
}

/// Authoritative pose of one player as carried in state broadcasts.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct PlayerPose {
    pub id: u32,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

/// Movement input buffered on the server before application.
#[derive(Debug, Clone)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub move_x: f32,
    pub move_z: f32,
}
