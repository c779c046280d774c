// SPDX-License-Identifier: CEPL-1.0
use crate::config::SceneCfg;
use grove_math::{Mat4, Vec3};
use grove_render::{Model, ObjectId, TextureSlot};
use grove_scene::{Control, Scene, Texture};
use std::path::{Path, PathBuf};

pub const PLANE_SPEED: &str = "plane movement speed";
pub const CUBE_SPEED: &str = "cube rotation speed";

fn shader_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

/// A moving textured plane and a spinning textured cube.
pub struct Demo {
    pub scene: Scene,
    plane: ObjectId,
    cube: ObjectId,
    plane_phase: f32,
    cube_angle_deg: f32,
}

impl Demo {
    pub fn new(cfg: &SceneCfg) -> Self {
        let dir = shader_dir();
        let mut scene = Scene::new("main", dir.join("basic.vert"), dir.join("basic.frag"));

        scene.camera_mut().translate(Vec3::new(0.0, 3.0, 1.0));
        scene.camera_mut().rotate(Vec3::new(0.0, -90.0, 0.0));

        scene.add_control(PLANE_SPEED, Control::slider(0.0, 5.0, 1.0));
        scene.add_control(CUBE_SPEED, Control::slider(0.0, 5.0, 1.0));

        let plane = scene.create_object();
        if let Some(entry) = scene.asset_mut(plane) {
            entry.model = Model::plane(0.5, 0.5);
            entry.set_texture(
                TextureSlot::Albedo,
                texture_or_checker(&cfg.plane_texture, [230, 140, 60, 255]),
            );
        }

        let cube = scene.create_object();
        if let Some(entry) = scene.asset_mut(cube) {
            entry.model = Model::cube_uv(0.5, 0.5, 0.5);
            entry.set_texture(
                TextureSlot::Albedo,
                texture_or_checker(&cfg.cube_texture, [70, 160, 230, 255]),
            );
        }

        Self {
            scene,
            plane,
            cube,
            plane_phase: 0.0,
            cube_angle_deg: 0.0,
        }
    }

    /// Advances both animations by `frame_time_ms`, scaled by their sliders.
    pub fn update(&mut self, frame_time_ms: f32) {
        let plane_speed = self.scene.slider_value(PLANE_SPEED).unwrap_or(0.0);
        let cube_speed = self.scene.slider_value(CUBE_SPEED).unwrap_or(0.0);

        self.plane_phase += frame_time_ms * 0.0025 * plane_speed;
        self.cube_angle_deg += frame_time_ms * 0.25 * cube_speed;

        let p = self.plane_phase;
        if let Some(obj) = self.scene.object_mut(self.plane) {
            obj.transform = Mat4::from_translation(Vec3::new(p.sin(), p.cos(), (p * 2.0).sin() / 2.0));
        }
        if let Some(obj) = self.scene.object_mut(self.cube) {
            obj.transform = Mat4::from_rotation_z(-self.cube_angle_deg.to_radians());
        }
    }
}

fn texture_or_checker(path: &Option<PathBuf>, tint: [u8; 4]) -> Texture {
    match path {
        Some(p) => Texture::from_path(p),
        None => Texture::checker(64, 8, tint, [245, 245, 245, 255]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_render::SceneSource;

    #[test]
    fn demo_commits_two_drawables() {
        let mut demo = Demo::new(&SceneCfg::default());
        demo.scene.commit().unwrap();
        assert_eq!(demo.scene.drawable_objects().len(), 2);
        assert!(demo.scene.vertex_shader().ends_with("basic.vert"));
        assert!(demo.scene.vertex_shader().exists());
        assert!(demo.scene.fragment_shader().exists());
    }

    #[test]
    fn animation_follows_sliders() {
        let mut demo = Demo::new(&SceneCfg::default());
        demo.update(100.0);
        let moved = demo.scene.transform(demo.plane);
        assert_ne!(moved, Mat4::IDENTITY);

        if let Some(c) = demo.scene.control_mut(PLANE_SPEED) {
            *c = Control::slider(0.0, 5.0, 0.0);
        }
        demo.update(100.0);
        assert_eq!(demo.scene.transform(demo.plane), moved);
    }
}
