// SPDX-License-Identifier: CEPL-1.0
use crate::buffer::GpuBuffer;
use crate::commands::CommandPool;
use crate::context::DeviceContext;
use crate::device_image::{subresource, DeviceImage, ImageDesc};
use crate::error::{RenderResult, ResourceStage, VkResultExt};
use ash::vk;
use grove_render::PixelSource;
use tracing::debug;

/// Anisotropy we ask for before clamping to the device limit.
pub const DESIRED_ANISOTROPY: f32 = 16.0;

/// `None` disables anisotropic filtering.
pub fn sampler_anisotropy(supported: bool, device_max: f32) -> Option<f32> {
    supported.then(|| DESIRED_ANISOTROPY.min(device_max).max(1.0))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BarrierMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Access and stage masks for the layout changes a texture upload goes
/// through. Anything else gets a full (slow but correct) barrier.
pub(crate) fn barrier_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> BarrierMasks {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => BarrierMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            BarrierMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            }
        }
        _ => BarrierMasks {
            src_access: vk::AccessFlags::MEMORY_WRITE,
            dst_access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            src_stage: vk::PipelineStageFlags::ALL_COMMANDS,
            dst_stage: vk::PipelineStageFlags::ALL_COMMANDS,
        },
    }
}

/// Sampled RGBA8 texture: image, view and sampler.
pub struct GpuTexture {
    device: ash::Device,
    image: DeviceImage,
    sampler: vk::Sampler,
    anisotropy: Option<f32>,
}

impl GpuTexture {
    /// Stages `source` and copies it into a new shader-readable image.
    ///
    /// # Safety
    /// `uploader` must come from `ctx`'s device.
    pub unsafe fn upload(
        ctx: &DeviceContext,
        uploader: &CommandPool,
        source: &PixelSource,
    ) -> RenderResult<Self> {
        let extent = vk::Extent2D {
            width: source.width(),
            height: source.height(),
        };
        let image = unsafe {
            DeviceImage::new(
                ctx,
                ImageDesc {
                    extent,
                    format: vk::Format::R8G8B8A8_SRGB,
                    usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                    aspect: vk::ImageAspectFlags::COLOR,
                    samples: vk::SampleCountFlags::TYPE_1,
                },
            )
        }?;

        let mut staging = unsafe {
            GpuBuffer::allocate(
                ctx,
                source.byte_len() as vk::DeviceSize,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                false,
            )
        }?;
        unsafe { staging.write_mapped(source.pixels()) }?;

        let handle = image.image();
        unsafe {
            transition(
                uploader,
                handle,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;

            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            let src = staging.handle();
            uploader.one_shot(|d, cmd| {
                d.cmd_copy_buffer_to_image(
                    cmd,
                    src,
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&region),
                );
            })?;

            transition(
                uploader,
                handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
        }

        let limits = ctx.limits();
        let anisotropy = sampler_anisotropy(limits.sampler_anisotropy, limits.max_sampler_anisotropy);
        let sampler_ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            anisotropy_enable: anisotropy.is_some().into(),
            max_anisotropy: anisotropy.unwrap_or(1.0),
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: vk::FALSE,
            compare_enable: vk::FALSE,
            compare_op: vk::CompareOp::ALWAYS,
            min_lod: 0.0,
            max_lod: 0.0,
            mip_lod_bias: 0.0,
            ..Default::default()
        };
        let sampler = unsafe { ctx.device().create_sampler(&sampler_ci, None) }
            .stage(ResourceStage::Sampler)?;

        debug!(
            "texture {}x{} uploaded ({} bytes, anisotropy {:?})",
            extent.width,
            extent.height,
            source.byte_len(),
            anisotropy
        );
        Ok(Self {
            device: ctx.device().clone(),
            image,
            sampler,
            anisotropy,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    pub fn anisotropy(&self) -> Option<f32> {
        self.anisotropy
    }

    /// Releases sampler, view, image and memory. Safe to call more than once.
    ///
    /// # Safety
    /// The GPU must no longer sample the texture.
    pub unsafe fn free(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
                self.sampler = vk::Sampler::null();
            }
            self.image.destroy();
        }
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        unsafe { self.free() };
    }
}

unsafe fn transition(
    uploader: &CommandPool,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RenderResult<()> {
    let masks = barrier_masks(old, new);
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: masks.src_access,
        dst_access_mask: masks.dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: subresource(vk::ImageAspectFlags::COLOR),
        ..Default::default()
    };
    unsafe {
        uploader.one_shot(|d, cmd| {
            d.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
        })
    }
}
