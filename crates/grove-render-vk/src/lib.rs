// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device context, swapchain, frame ring, pipeline and the
//! per-object draw submission behind [`VkRenderer`].
#![deny(unsafe_op_in_unsafe_fn)]
mod buffer;
mod cache;
mod commands;
mod context;
mod debug;
mod descriptor;
mod device_image;
mod error;
mod frame;
mod memory;
mod pipeline;
mod renderer;
mod resources;
mod shader;
mod swapchain;
mod sync;
mod texture;
mod ubo;

pub use buffer::GpuBuffer;
pub use cache::{pipeline_cache_path, PipelineCache};
pub use commands::CommandPool;
pub use context::{
    first_depth_format, pick_queue_families, DeviceContext, DeviceLimits, QueueFamilies,
    DEPTH_CANDIDATES,
};
pub use descriptor::{descriptor_index, descriptor_plan, SetBinding, SetResources};
pub use device_image::{DeviceImage, ImageDesc};
pub use error::{RenderError, RenderResult, ResourceStage};
pub use frame::{Acquire, FrameDriver, FrameStages, FrameStats, PendingReload, Presentation};
pub use memory::find_memory_type;
pub use pipeline::{
    attachment_descriptions, clear_values, vertex_input, Pipeline, PipelineState, PipelineTargets,
};
pub use renderer::VkRenderer;
pub use resources::{pack_geometry, DrawCall, DrawList, SceneResources};
pub use shader::{compile_glsl, stage_from_path, vk_stage, ShaderModule};
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    effective_msaa, msaa_change, present_mode_from_vk, sample_count, sharing, vk_present_mode,
    Swapchain, SwapchainRequest,
};
pub use sync::{FrameSlot, FrameSyncRing, RingCursor};
pub use texture::{sampler_anisotropy, GpuTexture, DESIRED_ANISOTROPY};
pub use ubo::Mvp;

pub use ash::vk;
