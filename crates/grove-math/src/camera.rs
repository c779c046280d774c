// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};

/// Orbit-style camera: yaw around Z, pitch around X, with the pitch held in
/// [-179.999°, 0°] so the view never rolls over the pole.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    transform: Mat4,
    rotation: Vec3,
}

const PITCH_MIN: f32 = -179.999;

impl Camera {
    pub fn new() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            rotation: Vec3::ZERO,
        }
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Accumulated rotation in radians (x = yaw, y = pitch).
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    pub fn view_matrix(&self) -> Mat4 {
        let position = self.position();
        let forward = -self.transform.z_axis.truncate().normalize();
        let right = self.transform.x_axis.truncate().normalize();
        let up = right.cross(forward).normalize();
        Mat4::look_at_rh(position, position + forward, -up)
    }

    /// Applies a rotation delta in degrees and returns the new accumulated
    /// rotation in radians. Position is preserved.
    pub fn rotate(&mut self, delta_deg: Vec3) -> Vec3 {
        self.rotation += Vec3::new(
            delta_deg.x.to_radians(),
            delta_deg.y.to_radians(),
            delta_deg.z.to_radians(),
        );
        self.rotation.y = self.rotation.y.clamp(PITCH_MIN.to_radians(), 0.0);

        let position = self.transform.w_axis;
        self.transform =
            Mat4::from_rotation_z(self.rotation.x) * Mat4::from_rotation_x(self.rotation.y);
        self.transform.w_axis = position;
        self.rotation
    }

    /// Moves the camera in its local frame and returns the new position.
    pub fn translate(&mut self, delta: Vec3) -> Vec3 {
        self.transform *= Mat4::from_translation(delta);
        self.position()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_clamped() {
        let mut cam = Camera::new();
        let r = cam.rotate(Vec3::new(0.0, 45.0, 0.0));
        assert_eq!(r.y, 0.0);
        let r = cam.rotate(Vec3::new(0.0, -400.0, 0.0));
        assert!((r.y - PITCH_MIN.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn rotate_keeps_position() {
        let mut cam = Camera::new();
        cam.translate(Vec3::new(1.0, 2.0, 3.0));
        cam.rotate(Vec3::new(30.0, -60.0, 0.0));
        assert!(cam.position().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
    }

    #[test]
    fn translate_is_local() {
        let mut cam = Camera::new();
        cam.rotate(Vec3::new(90.0, 0.0, 0.0));
        let p = cam.translate(Vec3::X);
        // 90° about Z turns local +X into world +Y.
        assert!(p.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn view_matrix_is_finite_at_rest() {
        let mut cam = Camera::new();
        cam.translate(Vec3::new(0.0, 0.0, 5.0));
        assert!(cam.view_matrix().is_finite());
    }
}
