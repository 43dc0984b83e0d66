//! World positions and the little bit of vector math the display layer needs.
//!
//! Rotations follow the usual block-game convention: yaw in degrees where 0
//! faces +Z and 90 faces -X, pitch in degrees where positive looks down.

use serde::{Deserialize, Serialize};

/// Height of a standing player's eyes above their feet.
pub const PLAYER_EYE_HEIGHT: f64 = 1.62;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(&self) -> f64 {
        self.dot(self)
    }

    /// Returns the unit vector, or `None` for the zero vector.
    pub fn normalize(&self) -> Option<Vec3> {
        let length = self.length_squared().sqrt();
        if length == 0.0 || !length.is_finite() {
            return None;
        }
        Some(Vec3::new(self.x / length, self.y / length, self.z / length))
    }
}

/// A position inside a named world together with a view rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn same_world(&self, other: &Location) -> bool {
        self.world == other.world
    }

    /// Squared distance between the two positions, ignoring the world.
    pub fn distance_squared(&self, other: &Location) -> f64 {
        self.position().sub(&other.position()).length_squared()
    }

    /// Returns a copy moved by the given offsets.
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Location {
        Location {
            world: self.world.clone(),
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    /// The eye position of an entity standing at this location.
    pub fn eye(&self, eye_height: f64) -> Location {
        self.offset(0.0, eye_height, 0.0)
    }

    /// Unit vector pointing where this rotation looks.
    pub fn direction(&self) -> Vec3 {
        let yaw = (self.yaw as f64).to_radians();
        let pitch = (self.pitch as f64).to_radians();
        let horizontal = pitch.cos();

        Vec3::new(-horizontal * yaw.sin(), -pitch.sin(), horizontal * yaw.cos())
    }

    /// Yaw and pitch that look along `direction`.
    ///
    /// A purely vertical direction keeps the current yaw.
    pub fn rotation_towards(&self, direction: &Vec3) -> (f32, f32) {
        let (x, z) = (direction.x, direction.z);

        if x == 0.0 && z == 0.0 {
            let pitch = if direction.y > 0.0 { -90.0 } else { 90.0 };
            return (self.yaw, pitch);
        }

        let theta = (-x).atan2(z);
        let full_turn = std::f64::consts::PI * 2.0;
        let yaw = ((theta + full_turn) % full_turn).to_degrees();

        let horizontal = (x * x + z * z).sqrt();
        let pitch = (-direction.y / horizontal).atan().to_degrees();

        (yaw as f32, pitch as f32)
    }
}

/// Packs an angle in degrees into the single byte the protocol carries.
pub fn angle_to_byte(degrees: f32) -> i8 {
    ((degrees % 360.0) * 256.0 / 360.0) as i32 as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_distance_squared() {
        let a = Location::new("world", 0.0, 0.0, 0.0);
        let b = Location::new("world", 3.0, 4.0, 0.0);
        assert_approx_eq!(a.distance_squared(&b), 25.0);
    }

    #[test]
    fn test_direction_cardinal() {
        let south = Location::new("world", 0.0, 0.0, 0.0);
        let dir = south.direction();
        assert_approx_eq!(dir.x, 0.0);
        assert_approx_eq!(dir.z, 1.0);

        let west = south.clone().with_rotation(90.0, 0.0);
        let dir = west.direction();
        assert_approx_eq!(dir.x, -1.0);
        assert_approx_eq!(dir.z, 0.0, 1e-9);

        let down = south.with_rotation(0.0, 90.0);
        assert_approx_eq!(down.direction().y, -1.0);
    }

    #[test]
    fn test_rotation_towards_matches_direction() {
        let origin = Location::new("world", 0.0, 64.0, 0.0);
        let target = Vec3::new(-5.0, 0.0, 5.0);
        let (yaw, pitch) = origin.rotation_towards(&target);

        let looking = origin.with_rotation(yaw, pitch).direction();
        let expected = target.normalize().unwrap();
        assert_approx_eq!(looking.x, expected.x, 1e-5);
        assert_approx_eq!(looking.z, expected.z, 1e-5);
        assert_approx_eq!(pitch, 0.0);
    }

    #[test]
    fn test_rotation_towards_vertical_keeps_yaw() {
        let origin = Location::new("world", 0.0, 0.0, 0.0).with_rotation(42.0, 0.0);
        let (yaw, pitch) = origin.rotation_towards(&Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(yaw, 42.0);
        assert_eq!(pitch, -90.0);
    }

    #[test]
    fn test_normalize_zero() {
        assert!(Vec3::default().normalize().is_none());
    }

    #[test]
    fn test_angle_to_byte() {
        assert_eq!(angle_to_byte(0.0), 0);
        assert_eq!(angle_to_byte(90.0), 64);
        assert_eq!(angle_to_byte(180.0), -128);
        assert_eq!(angle_to_byte(270.0), -64);
        assert_eq!(angle_to_byte(360.0), 0);
    }
}
