// SPDX-License-Identifier: CEPL-1.0
use crate::descriptor::{self, SetResources};
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use crate::shader::{self, ShaderModule};
use ash::vk;
use grove_render::{ShaderStage, Vertex};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Where the pipeline is in its build protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Unbuilt,
    DescriptorsReady,
    Built,
}

/// The attachment formats and sample count the render pass is built for.
/// A change to any of these forces a graphics rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineTargets {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub sample_shading: bool,
}

impl PipelineTargets {
    pub fn multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }
}

/// Attachment list in framebuffer order: [color, resolve (MSAA only), depth].
pub fn attachment_descriptions(targets: &PipelineTargets) -> Vec<vk::AttachmentDescription> {
    let msaa = targets.multisampled();
    let mut out = Vec::with_capacity(3);

    out.push(vk::AttachmentDescription {
        format: targets.color_format,
        samples: targets.samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: if msaa {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        },
        ..Default::default()
    });
    if msaa {
        out.push(vk::AttachmentDescription {
            format: targets.color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        });
    }
    out.push(vk::AttachmentDescription {
        format: targets.depth_format,
        samples: targets.samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    });
    out
}

/// Clear values matching `attachment_descriptions`. The resolve slot is
/// ignored by the driver but still has to be present.
pub fn clear_values(color: [f32; 4], multisampled: bool) -> Vec<vk::ClearValue> {
    let color = vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    };
    let depth = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    };
    if multisampled {
        vec![color, color, depth]
    } else {
        vec![color, depth]
    }
}

/// Vertex binding 0: position, color, uv.
pub fn vertex_input() -> (
    vk::VertexInputBindingDescription,
    [vk::VertexInputAttributeDescription; 3],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let vec3 = std::mem::size_of::<[f32; 3]>() as u32;
    let attrs = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: vec3,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: vec3 * 2,
        },
    ];
    (binding, attrs)
}

/// The scene's one graphics pipeline together with its render pass,
/// descriptor layout, pool and sets.
///
/// STRICT TEARDOWN ORDER (also used by `destroy_graphics` on rebuild):
///   pipeline -> pipeline layout -> render pass -> descriptor pool -> set layout
pub struct Pipeline {
    device: ash::Device,
    cache: vk::PipelineCache,
    state: PipelineState,
    targets: Option<PipelineTargets>,
    shaders: BTreeMap<ShaderStage, ShaderModule>,

    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,

    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// `cache` may be null. It is borrowed, not owned.
    pub fn new(device: &ash::Device, cache: vk::PipelineCache) -> Self {
        Self {
            device: device.clone(),
            cache,
            state: PipelineState::Unbuilt,
            targets: None,
            shaders: BTreeMap::new(),
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
        }
    }

    /// Compiles `path` and replaces the module for `stage`. Takes effect on the
    /// next `reload(true, ..)`. On failure the previous module is kept.
    ///
    /// # Safety
    /// The device must be live.
    pub unsafe fn bind_shader(&mut self, path: &Path, stage: ShaderStage) -> RenderResult<()> {
        let module = unsafe { ShaderModule::from_file(&self.device, path, stage) }?;
        info!("bound {} shader {:?}", stage, path);
        self.shaders.insert(stage, module);
        Ok(())
    }

    pub fn shader_source(&self, stage: ShaderStage) -> Option<&Path> {
        self.shaders.get(&stage).map(ShaderModule::source)
    }

    /// Rebuilds the descriptor layout, pool and sets for `sets.len()` sets, and
    /// the render pass plus graphics pipeline when `rebuild_graphics` is set.
    /// A rebuild is forced when nothing is built yet or `targets` changed.
    /// Returns whether the graphics objects were rebuilt; callers must then
    /// rebuild framebuffers against the new render pass.
    ///
    /// # Safety
    /// The GPU must be idle with respect to every object this pipeline owns.
    pub unsafe fn reload(
        &mut self,
        rebuild_graphics: bool,
        targets: PipelineTargets,
        sets: &[SetResources],
    ) -> RenderResult<bool> {
        let rebuild_graphics = rebuild_graphics
            || self.state != PipelineState::Built
            || self.targets != Some(targets);

        // Check before tearing anything down so a missing stage leaves the old
        // pipeline usable.
        if rebuild_graphics {
            for stage in ShaderStage::ALL {
                if !self.shaders.contains_key(&stage) {
                    return Err(RenderError::MissingShader(stage));
                }
            }
        }

        unsafe {
            self.destroy_descriptors();
            self.state = PipelineState::Unbuilt;
            self.create_descriptors(sets)?;
            self.state = PipelineState::DescriptorsReady;

            if rebuild_graphics {
                self.destroy_graphics();
                self.create_graphics(targets)?;
                self.targets = Some(targets);
                info!(
                    "pipeline rebuilt: color={:?} depth={:?} samples={:?} sets={}",
                    targets.color_format,
                    targets.depth_format,
                    targets.samples,
                    self.sets.len()
                );
            } else {
                debug!("pipeline descriptors rebuilt: sets={}", self.sets.len());
            }
        }
        self.state = PipelineState::Built;
        Ok(rebuild_graphics)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn targets(&self) -> Option<PipelineTargets> {
        self.targets
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    pub fn descriptor_set(&self, index: usize) -> vk::DescriptorSet {
        self.sets[index]
    }

    unsafe fn create_descriptors(&mut self, sets: &[SetResources]) -> RenderResult<()> {
        let bindings = descriptor::layout_bindings();
        let layout_ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        self.set_layout = unsafe { self.device.create_descriptor_set_layout(&layout_ci, None) }
            .stage(ResourceStage::DescriptorSetLayout)?;

        let sizes = descriptor::pool_sizes(sets.len());
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: sets.len().max(1) as u32,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        self.pool = unsafe { self.device.create_descriptor_pool(&pool_ci, None) }
            .stage(ResourceStage::DescriptorPool)?;

        if sets.is_empty() {
            return Ok(());
        }
        let layouts = vec![self.set_layout; sets.len()];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.pool,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        self.sets = unsafe { self.device.allocate_descriptor_sets(&alloc) }
            .stage(ResourceStage::DescriptorSet)?;
        unsafe { descriptor::write_sets(&self.device, &self.sets, sets) };
        Ok(())
    }

    unsafe fn destroy_descriptors(&mut self) {
        unsafe {
            // Sets are returned with the pool.
            self.sets.clear();
            if self.pool != vk::DescriptorPool::null() {
                self.device.destroy_descriptor_pool(self.pool, None);
                self.pool = vk::DescriptorPool::null();
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                self.device.destroy_descriptor_set_layout(self.set_layout, None);
                self.set_layout = vk::DescriptorSetLayout::null();
            }
        }
    }

    unsafe fn create_graphics(&mut self, targets: PipelineTargets) -> RenderResult<()> {
        unsafe {
            self.render_pass = self.create_render_pass(&targets)?;

            let layout_ci = vk::PipelineLayoutCreateInfo {
                s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
                set_layout_count: 1,
                p_set_layouts: &self.set_layout,
                ..Default::default()
            };
            self.layout = self
                .device
                .create_pipeline_layout(&layout_ci, None)
                .stage(ResourceStage::PipelineLayout)?;

            self.pipeline = self.create_pipeline(&targets)?;
        }
        Ok(())
    }

    unsafe fn destroy_graphics(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
                self.pipeline = vk::Pipeline::null();
            }
            if self.layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(self.layout, None);
                self.layout = vk::PipelineLayout::null();
            }
            if self.render_pass != vk::RenderPass::null() {
                self.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
        }
        self.targets = None;
    }

    unsafe fn create_render_pass(&self, targets: &PipelineTargets) -> RenderResult<vk::RenderPass> {
        let attachments = attachment_descriptions(targets);
        let msaa = targets.multisampled();

        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let resolve_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: attachments.len() as u32 - 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_resolve_attachments: if msaa { &resolve_ref } else { std::ptr::null() },
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };

        // Gate our attachment writes behind whatever the previous frame (or
        // the presentation engine) did with the same images.
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            dst_stage_mask: stages,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let ci = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        unsafe { self.device.create_render_pass(&ci, None) }.stage(ResourceStage::RenderPass)
    }

    unsafe fn create_pipeline(&self, targets: &PipelineTargets) -> RenderResult<vk::Pipeline> {
        let entry = c"main";
        let stages: Vec<_> = ShaderStage::ALL
            .iter()
            .filter_map(|s| self.shaders.get(s))
            .map(|m| vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: shader::vk_stage(m.stage()),
                module: m.handle(),
                p_name: entry.as_ptr(),
                ..Default::default()
            })
            .collect();

        let (vb, va) = vertex_input();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &vb,
            vertex_attribute_description_count: va.len() as u32,
            p_vertex_attribute_descriptions: va.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let sample_shading = targets.sample_shading && targets.multisampled();
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: targets.samples,
            sample_shading_enable: sample_shading.into(),
            min_sample_shading: 1.0,
            ..Default::default()
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
            depth_test_enable: vk::TRUE,
            depth_write_enable: vk::TRUE,
            depth_compare_op: vk::CompareOp::LESS,
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_depth_stencil_state: &depth_stencil,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout: self.layout,
            render_pass: self.render_pass,
            subpass: 0,
            ..Default::default()
        };

        match unsafe {
            self.device
                .create_graphics_pipelines(self.cache, std::slice::from_ref(&info), None)
        } {
            Ok(p) => Ok(p[0]),
            Err((_, result)) => Err(RenderError::ResourceCreationFailed {
                stage: ResourceStage::Pipeline,
                result,
            }),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.destroy_graphics();
            self.destroy_descriptors();
        }
        // Shader modules drop with the map.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(samples: vk::SampleCountFlags) -> PipelineTargets {
        PipelineTargets {
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: vk::Format::D32_SFLOAT,
            samples,
            sample_shading: true,
        }
    }

    #[test]
    fn single_sample_presents_color_directly() {
        let a = attachment_descriptions(&targets(vk::SampleCountFlags::TYPE_1));
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(a[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a[1].format, vk::Format::D32_SFLOAT);
        assert_eq!(a[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn msaa_resolves_into_present_source() {
        let a = attachment_descriptions(&targets(vk::SampleCountFlags::TYPE_4));
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(a[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(a[1].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(a[1].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(a[2].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            a[2].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn clear_values_line_up_with_attachments() {
        assert_eq!(clear_values([0.0; 4], false).len(), 2);
        let c = clear_values([0.1, 0.2, 0.3, 1.0], true);
        assert_eq!(c.len(), 3);
        assert_eq!(unsafe { c[2].depth_stencil.depth }, 1.0);
        assert_eq!(unsafe { c[0].color.float32 }, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn vertex_layout_matches_vertex_struct() {
        let (b, a) = vertex_input();
        assert_eq!(b.stride, 32);
        assert_eq!(
            a.iter().map(|x| (x.location, x.offset)).collect::<Vec<_>>(),
            [(0, 0), (1, 12), (2, 24)]
        );
        assert_eq!(a[2].format, vk::Format::R32G32_SFLOAT);
    }
}
