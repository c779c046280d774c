// SPDX-License-Identifier: CEPL-1.0
//! Authoring-side scene: objects, their assets, a camera and UI controls.
//!
//! `Scene` implements [`grove_render::SceneSource`]; every successful
//! [`Scene::commit`] bumps the generation the renderer watches.
#![deny(unsafe_op_in_unsafe_fn)]
mod asset;
mod controls;

pub use asset::{AssetEntry, Texture};
pub use controls::{draw_control, Control, ControlSink};
pub use grove_math::Camera;

use grove_math::{Mat4, Vec3};
use grove_render::{Model, ObjectId, PixelSource, SceneSource, TextureSlot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to decode texture {path:?}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture {path:?} decoded to an unusable {width}x{height} image")]
    EmptyImage {
        path: PathBuf,
        width: u32,
        height: u32,
    },
}

#[derive(Clone, Debug)]
pub struct Object {
    id: ObjectId,
    pub transform: Mat4,
}

impl Object {
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

pub struct Scene {
    name: String,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
    camera: Camera,

    next_id: u64,
    objects: BTreeMap<ObjectId, Object>,
    assets: BTreeMap<ObjectId, AssetEntry>,
    controls: BTreeMap<String, Control>,

    drawable: Vec<ObjectId>,
    generation: u64,
}

impl Scene {
    pub fn new(
        name: impl Into<String>,
        vertex_shader: impl Into<PathBuf>,
        fragment_shader: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            camera: Camera::new(),
            next_id: 0,
            objects: BTreeMap::new(),
            assets: BTreeMap::new(),
            controls: BTreeMap::new(),
            drawable: Vec::new(),
            generation: 0,
        }
    }

    pub fn set_vertex_shader(&mut self, path: impl Into<PathBuf>) {
        self.vertex_shader = path.into();
    }

    pub fn set_fragment_shader(&mut self, path: impl Into<PathBuf>) {
        self.fragment_shader = path.into();
    }

    /// Adds an empty object (identity transform, no model). Ids increase
    /// monotonically, so creation order is draw order.
    pub fn create_object(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            Object {
                id,
                transform: Mat4::IDENTITY,
            },
        );
        self.assets.insert(id, AssetEntry::default());
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        self.assets.remove(&id);
        self.objects.remove(&id).is_some()
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn asset(&self, id: ObjectId) -> Option<&AssetEntry> {
        self.assets.get(&id)
    }

    pub fn asset_mut(&mut self, id: ObjectId) -> Option<&mut AssetEntry> {
        self.assets.get_mut(&id)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn add_control(&mut self, label: impl Into<String>, control: Control) {
        self.controls.insert(label.into(), control);
    }

    pub fn control(&self, label: &str) -> Option<&Control> {
        self.controls.get(label)
    }

    pub fn control_mut(&mut self, label: &str) -> Option<&mut Control> {
        self.controls.get_mut(label)
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Current value of a slider control, `None` if missing or not a slider.
    pub fn slider_value(&self, label: &str) -> Option<f32> {
        match self.controls.get(label)? {
            Control::SliderF32 { value, .. } => Some(*value),
            Control::Button { .. } => None,
        }
    }

    /// Draws every control through `sink` in label order. Returns true if any
    /// control changed.
    pub fn draw_controls(&mut self, sink: &mut dyn ControlSink) -> bool {
        let mut changed = false;
        for (label, control) in &mut self.controls {
            changed |= draw_control(sink, label, control);
        }
        changed
    }

    pub fn is_object_drawable(&self, id: ObjectId) -> bool {
        self.assets.get(&id).is_some_and(|a| a.model.is_drawable())
    }

    /// Decodes pending textures, recomputes the drawable list and bumps the
    /// generation so the renderer reloads GPU resources before its next frame.
    pub fn commit(&mut self) -> Result<(), SceneError> {
        for entry in self.assets.values_mut() {
            entry.load_textures()?;
        }

        self.drawable = self
            .objects
            .keys()
            .copied()
            .filter(|id| self.is_object_drawable(*id))
            .collect();
        self.generation += 1;

        debug!(
            "scene '{}' committed: {} objects, {} drawable, generation {}",
            self.name,
            self.objects.len(),
            self.drawable.len(),
            self.generation
        );
        Ok(())
    }
}

impl SceneSource for Scene {
    fn name(&self) -> &str {
        &self.name
    }

    fn drawable_objects(&self) -> &[ObjectId] {
        &self.drawable
    }

    fn model(&self, id: ObjectId) -> Option<&Model> {
        self.assets.get(&id).map(|a| &a.model)
    }

    fn transform(&self, id: ObjectId) -> Mat4 {
        self.objects
            .get(&id)
            .map_or(Mat4::IDENTITY, |o| o.transform)
    }

    fn texture(&self, id: ObjectId, slot: TextureSlot) -> Option<&PixelSource> {
        self.assets.get(&id)?.textures.get(&slot)?.pixels()
    }

    fn view_matrix(&self) -> Mat4 {
        self.camera.view_matrix()
    }

    fn camera_position(&self) -> Vec3 {
        self.camera.position()
    }

    fn vertex_shader(&self) -> &Path {
        &self.vertex_shader
    }

    fn fragment_shader(&self) -> &Path {
        &self.fragment_shader
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene::new("test", "a.vert", "a.frag")
    }

    #[test]
    fn ids_are_monotonic() {
        let mut s = scene();
        let a = s.create_object();
        let b = s.create_object();
        assert!(a < b);
        s.remove_object(a);
        assert!(s.create_object() > b);
    }

    #[test]
    fn commit_lists_only_drawable_objects_in_id_order() {
        let mut s = scene();
        let empty = s.create_object();
        let cube = s.create_object();
        let plane = s.create_object();
        s.asset_mut(plane).unwrap().model = Model::plane(1.0, 1.0);
        s.asset_mut(cube).unwrap().model = Model::cube(1.0, 1.0, 1.0);

        assert!(s.drawable_objects().is_empty());
        s.commit().unwrap();
        assert_eq!(s.drawable_objects(), &[cube, plane]);
        assert!(!s.is_object_drawable(empty));
    }

    #[test]
    fn commit_bumps_generation() {
        let mut s = scene();
        assert_eq!(s.generation(), 0);
        s.commit().unwrap();
        s.commit().unwrap();
        assert_eq!(s.generation(), 2);
    }

    #[test]
    fn vertices_without_indices_are_not_drawable() {
        let mut s = scene();
        let id = s.create_object();
        s.asset_mut(id).unwrap().model.vertices = Model::plane(1.0, 1.0).vertices;
        s.commit().unwrap();
        assert!(s.drawable_objects().is_empty());
    }

    #[test]
    fn transform_defaults_to_identity_for_unknown_ids() {
        let s = scene();
        assert_eq!(s.transform(ObjectId(42)), Mat4::IDENTITY);
    }

    #[test]
    fn slider_lookup() {
        let mut s = scene();
        s.add_control("speed", Control::slider(0.0, 2.0, 1.0));
        s.add_control("reset", Control::button());
        assert_eq!(s.slider_value("speed"), Some(1.0));
        assert_eq!(s.slider_value("reset"), None);
        assert_eq!(s.slider_value("missing"), None);
    }
}
