// SPDX-License-Identifier: CEPL-1.0
use crate::buffer::GpuBuffer;
use crate::commands::CommandPool;
use crate::context::DeviceContext;
use crate::descriptor::{descriptor_index, descriptor_plan, SetResources};
use crate::error::RenderResult;
use crate::texture::GpuTexture;
use crate::ubo::Mvp;
use ash::vk;
use grove_math::Mat4;
use grove_render::{ObjectId, PixelSource, SceneSource, TextureSlot, Vertex};
use std::mem::size_of;
use tracing::{debug, info};

/// One indexed draw into the shared vertex/index buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub object: ObjectId,
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

/// Draw calls in scene draw order, with offsets accumulated over the models
/// packed back to back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawList {
    calls: Vec<DrawCall>,
    vertex_count: u32,
    index_count: u32,
}

impl DrawList {
    pub fn build(scene: &dyn SceneSource) -> Self {
        let mut list = DrawList::default();
        for &id in scene.drawable_objects() {
            let Some(model) = scene.model(id) else {
                continue;
            };
            if !model.is_drawable() {
                continue;
            }
            list.calls.push(DrawCall {
                object: id,
                index_count: model.indices.len() as u32,
                first_index: list.index_count,
                vertex_offset: list.vertex_count as i32,
            });
            list.vertex_count += model.vertices.len() as u32;
            list.index_count += model.indices.len() as u32;
        }
        list
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Concatenates the vertex and index bytes of every draw in `draws` order,
/// matching the offsets `DrawList::build` assigned.
pub fn pack_geometry(scene: &dyn SceneSource, draws: &DrawList) -> (Vec<u8>, Vec<u8>) {
    let mut vertex_bytes = Vec::with_capacity(draws.vertex_count() as usize * size_of::<Vertex>());
    let mut index_bytes = Vec::with_capacity(draws.index_count() as usize * size_of::<u32>());
    for call in draws.calls() {
        if let Some(model) = scene.model(call.object) {
            vertex_bytes.extend_from_slice(model.vertex_bytes());
            index_bytes.extend_from_slice(model.index_bytes());
        }
    }
    (vertex_bytes, index_bytes)
}

/// Every GPU object a loaded scene needs. Built in one go by `load` and
/// replaced wholesale on reload; never patched in place.
pub struct SceneResources {
    draws: DrawList,
    frames: usize,
    vertices: Option<GpuBuffer>,
    indices: Option<GpuBuffer>,
    uniforms: Vec<GpuBuffer>,
    albedo: Vec<Option<GpuTexture>>,
    fallback: GpuTexture,
}

impl SceneResources {
    /// Uploads the drawable part of `scene`: packed vertex and index buffers,
    /// `frames * objects` mapped uniform buffers and per-object textures.
    /// Blocks on the staging copies.
    ///
    /// # Safety
    /// `uploader` must come from `ctx`'s device; the result must drop first.
    pub unsafe fn load(
        ctx: &DeviceContext,
        uploader: &CommandPool,
        scene: &dyn SceneSource,
        frames: usize,
    ) -> RenderResult<Self> {
        let draws = DrawList::build(scene);
        let frames = frames.max(1);

        let (vertex_bytes, index_bytes) = pack_geometry(scene, &draws);

        let vertices = unsafe {
            device_local(ctx, uploader, &vertex_bytes, vk::BufferUsageFlags::VERTEX_BUFFER)
        }?;
        let indices = unsafe {
            device_local(ctx, uploader, &index_bytes, vk::BufferUsageFlags::INDEX_BUFFER)
        }?;

        let mut uniforms = Vec::with_capacity(draws.len() * frames);
        for _ in 0..draws.len() * frames {
            uniforms.push(unsafe {
                GpuBuffer::allocate(
                    ctx,
                    Mvp::SIZE,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                    true,
                )
            }?);
        }

        let mut albedo = Vec::with_capacity(draws.len());
        for call in draws.calls() {
            let tex = match scene.texture(call.object, TextureSlot::Albedo) {
                Some(px) => Some(unsafe { GpuTexture::upload(ctx, uploader, px) }?),
                None => None,
            };
            albedo.push(tex);
        }
        let fallback =
            unsafe { GpuTexture::upload(ctx, uploader, &PixelSource::solid(1, 1, [255; 4])) }?;

        info!(
            "scene '{}' loaded: objects={} vertices={} ({} B) indices={} ({} B) uniforms={} textures={}",
            scene.name(),
            draws.len(),
            draws.vertex_count(),
            vertex_bytes.len(),
            draws.index_count(),
            index_bytes.len(),
            uniforms.len(),
            albedo.iter().flatten().count()
        );

        Ok(Self {
            draws,
            frames,
            vertices,
            indices,
            uniforms,
            albedo,
            fallback,
        })
    }

    pub fn draw_list(&self) -> &DrawList {
        &self.draws
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn vertex_buffer(&self) -> Option<vk::Buffer> {
        self.vertices.as_ref().map(GpuBuffer::handle)
    }

    pub fn index_buffer(&self) -> Option<vk::Buffer> {
        self.indices.as_ref().map(GpuBuffer::handle)
    }

    pub fn uniform_buffer(&self, index: usize) -> &GpuBuffer {
        &self.uniforms[index]
    }

    /// View and sampler bound at the albedo slot of draw `k`; the white
    /// fallback for objects without one.
    pub fn albedo(&self, k: usize) -> (vk::ImageView, vk::Sampler) {
        let tex = self.albedo[k].as_ref().unwrap_or(&self.fallback);
        (tex.view(), tex.sampler())
    }

    /// Handles for every descriptor set, in set-index order.
    pub fn set_resources(&self) -> Vec<SetResources> {
        descriptor_plan(self.draws.len(), self.frames)
            .into_iter()
            .map(|b| {
                let (view, sampler) = self.albedo(b.object);
                SetResources {
                    uniform: self.uniforms[b.set].handle(),
                    view,
                    sampler,
                }
            })
            .collect()
    }

    /// Writes this frame's model/view/projection into ring slot `slot`'s
    /// uniform buffers.
    ///
    /// # Safety
    /// The slot's previous submission must have retired.
    pub unsafe fn update_uniforms(
        &mut self,
        slot: usize,
        scene: &dyn SceneSource,
        view: Mat4,
        projection: Mat4,
    ) -> RenderResult<()> {
        for (k, call) in self.draws.calls.iter().enumerate() {
            let mvp = Mvp::new(scene.transform(call.object), view, projection);
            let buf = &mut self.uniforms[descriptor_index(k, slot, self.frames)];
            unsafe { buf.write_mapped(bytemuck::bytes_of(&mvp)) }?;
        }
        Ok(())
    }
}

unsafe fn device_local(
    ctx: &DeviceContext,
    uploader: &CommandPool,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> RenderResult<Option<GpuBuffer>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut buf = unsafe {
        GpuBuffer::allocate(
            ctx,
            bytes.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
        )
    }?;
    unsafe { buf.write(bytes, uploader) }?;
    debug!("device-local {:?} buffer: {} B", usage, bytes.len());
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_math::Vec3;
    use grove_render::{Model, Vertex};
    use std::collections::BTreeMap;
    use std::path::Path;

    struct Fixture {
        ids: Vec<ObjectId>,
        models: BTreeMap<ObjectId, Model>,
    }

    impl SceneSource for Fixture {
        fn drawable_objects(&self) -> &[ObjectId] {
            &self.ids
        }
        fn model(&self, id: ObjectId) -> Option<&Model> {
            self.models.get(&id)
        }
        fn transform(&self, _id: ObjectId) -> Mat4 {
            Mat4::IDENTITY
        }
        fn texture(&self, _id: ObjectId, _slot: TextureSlot) -> Option<&PixelSource> {
            None
        }
        fn view_matrix(&self) -> Mat4 {
            Mat4::IDENTITY
        }
        fn camera_position(&self) -> Vec3 {
            Vec3::ZERO
        }
        fn vertex_shader(&self) -> &Path {
            Path::new("v.vert")
        }
        fn fragment_shader(&self) -> &Path {
            Path::new("f.frag")
        }
        fn generation(&self) -> u64 {
            1
        }
    }

    fn model(verts: usize, indices: usize) -> Model {
        let v = Vertex::new([0.0; 3], [1.0; 3], [0.0; 2]);
        Model::new(vec![v; verts], (0..indices as u32).collect())
    }

    #[test]
    fn offsets_accumulate_in_draw_order() {
        let scene = Fixture {
            ids: vec![ObjectId(4), ObjectId(9)],
            models: BTreeMap::from([(ObjectId(4), model(3, 3)), (ObjectId(9), model(4, 6))]),
        };
        let list = DrawList::build(&scene);
        assert_eq!(
            list.calls(),
            [
                DrawCall {
                    object: ObjectId(4),
                    index_count: 3,
                    first_index: 0,
                    vertex_offset: 0
                },
                DrawCall {
                    object: ObjectId(9),
                    index_count: 6,
                    first_index: 3,
                    vertex_offset: 3
                },
            ]
        );
        assert_eq!((list.vertex_count(), list.index_count()), (7, 9));
    }

    #[test]
    fn skips_ids_without_usable_models() {
        let scene = Fixture {
            ids: vec![ObjectId(1), ObjectId(2), ObjectId(3)],
            models: BTreeMap::from([(ObjectId(1), model(0, 0)), (ObjectId(3), model(3, 3))]),
        };
        let list = DrawList::build(&scene);
        assert_eq!(list.len(), 1);
        assert_eq!(list.calls()[0].object, ObjectId(3));
        assert_eq!(list.calls()[0].vertex_offset, 0);
    }

    #[test]
    fn empty_scene_has_no_draws() {
        let scene = Fixture {
            ids: Vec::new(),
            models: BTreeMap::new(),
        };
        assert!(DrawList::build(&scene).is_empty());
    }
}
