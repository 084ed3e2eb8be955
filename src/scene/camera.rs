// src/scene/camera.rs
// Pinhole camera parameters consumed by the trace kernel

use glam::Vec3;

/// Camera parameter block. The basis vectors and viewport are derived in the
/// shader from these four fields, so this stays a plain value type.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub vertical_fov: f32,
}

impl Camera {
    pub fn new(position: Vec3, look_at: Vec3, up: Vec3, vertical_fov: f32) -> Self {
        Self {
            position,
            look_at,
            up,
            vertical_fov,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -1.0),
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            vertical_fov: 60.0,
        }
    }
}
