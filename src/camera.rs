use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::input::Movement;

/// Fixed world-up axis used to derive the camera's right and up vectors.
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Pitch limit in degrees; keeps forward away from the world-up singularity.
pub const PITCH_LIMIT: f32 = 89.0;

/// Tunable camera parameters loaded from the scene description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub position: Vec3,
    pub fov: f32,
    pub speed: f32,
    pub sensitivity: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            fov: 90.0,
            speed: 4.0,
            sensitivity: 0.1,
        }
    }
}

/// View basis handed to the compute kernel each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub right: Vec3,
}

/// Free-flying first person camera.
///
/// Forward starts on +Z with a yaw of 90 degrees so that the first
/// orientation update continues from the same direction instead of snapping.
/// `right` and `up` are never assigned directly; they are always derived from
/// `forward` and [`WORLD_UP`].
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub fov: f32,
    pub speed: f32,
    pub sensitivity: f32,
    yaw: f32,
    pitch: f32,
    position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraSettings::default())
    }
}

impl Camera {
    pub fn new(settings: CameraSettings) -> Self {
        let mut camera = Self {
            fov: settings.fov,
            speed: settings.speed,
            sensitivity: settings.sensitivity,
            yaw: 90.0,
            pitch: 0.0,
            position: settings.position,
            forward: Vec3::Z,
            right: Vec3::X,
            up: Vec3::Y,
        };
        camera.update_basis();
        camera
    }

    /// Applies raw pointer motion to yaw and pitch and rebuilds the basis.
    pub fn update_orientation(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let (yaw_sin, yaw_cos) = self.yaw.to_radians().sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.to_radians().sin_cos();
        self.forward = Vec3::new(yaw_cos * pitch_cos, pitch_sin, yaw_sin * pitch_cos).normalize();
        self.update_basis();
    }

    /// Moves the camera along its basis for every active direction.
    ///
    /// Directions are summed without normalization, so diagonal movement is
    /// faster than movement along a single axis.
    pub fn update_position(&mut self, movement: Movement, delta_time: f32) {
        if delta_time.is_finite() && delta_time > 0.0 {
            let step = self.speed * delta_time;
            if movement.forward {
                self.position += self.forward * step;
            }
            if movement.back {
                self.position -= self.forward * step;
            }
            if movement.left {
                self.position -= self.right * step;
            }
            if movement.right {
                self.position += self.right * step;
            }
            if movement.up {
                self.position += WORLD_UP * step;
            }
            if movement.down {
                self.position -= WORLD_UP * step;
            }
        }
        self.update_basis();
    }

    pub fn basis(&self) -> CameraBasis {
        CameraBasis {
            position: self.position,
            forward: self.forward,
            up: self.up,
            right: self.right,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    fn update_basis(&mut self) {
        self.right = WORLD_UP.cross(self.forward).normalize();
        self.up = self.forward.cross(self.right).normalize();
    }
}
