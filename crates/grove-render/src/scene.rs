// SPDX-License-Identifier: CEPL-1.0
use crate::{Model, PixelSource, TextureSlot};
use grove_math::{Mat4, Vec3};
use std::path::Path;

/// Stable identifier of a scene object. Draw order is ascending id order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of a scene, as consumed by a renderer.
///
/// The renderer compares `generation()` against the value it last loaded;
/// any change schedules a GPU resource reload at the next frame boundary.
pub trait SceneSource {
    fn name(&self) -> &str {
        "scene"
    }

    /// Objects with a drawable model, in draw order.
    fn drawable_objects(&self) -> &[ObjectId];
    fn model(&self, id: ObjectId) -> Option<&Model>;
    fn transform(&self, id: ObjectId) -> Mat4;
    fn texture(&self, id: ObjectId, slot: TextureSlot) -> Option<&PixelSource>;

    fn view_matrix(&self) -> Mat4;
    fn camera_position(&self) -> Vec3;

    fn vertex_shader(&self) -> &Path;
    fn fragment_shader(&self) -> &Path;

    /// Bumped every time the scene's GPU-visible content is committed.
    fn generation(&self) -> u64;
}
