// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod camera;
mod transform;

pub use camera::Camera;
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use transform::Transform;

/// Vertical field of view used by the scene camera.
pub const DEFAULT_FOV_Y_DEG: f32 = 75.0;
pub const DEFAULT_NEAR: f32 = 0.05;
pub const DEFAULT_FAR: f32 = 1000.0;

/// Right-handed perspective with Vulkan's [0, 1] depth range and clip-space Y
/// pointing down, so geometry authored Y-up lands upright on screen.
///
/// A zero-sized dimension is treated as 1 to keep the aspect ratio finite.
pub fn perspective_y_flipped(fov_y_deg: f32, width: u32, height: u32, near: f32, far: f32) -> Mat4 {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let mut proj = Mat4::perspective_rh(fov_y_deg.to_radians(), aspect, near, far);
    proj.y_axis.y *= -1.0;
    proj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_flips_y_and_keeps_x() {
        let flipped = perspective_y_flipped(75.0, 800, 600, 0.1, 100.0);
        let plain = Mat4::perspective_rh(75f32.to_radians(), 800.0 / 600.0, 0.1, 100.0);
        assert_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_eq!(flipped.x_axis.x, plain.x_axis.x);
    }

    #[test]
    fn projection_survives_zero_height() {
        let p = perspective_y_flipped(75.0, 640, 0, 0.1, 10.0);
        assert!(p.is_finite());
    }

    #[test]
    fn near_plane_maps_to_zero_depth() {
        let p = perspective_y_flipped(60.0, 1, 1, 0.5, 50.0);
        let clip = p * Vec4::new(0.0, 0.0, -0.5, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-5);
    }
}
