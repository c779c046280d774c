// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use grove_render::ShaderStage;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which Vulkan object a `ResourceCreationFailed` refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceStage {
    Buffer,
    Memory,
    Image,
    ImageView,
    Sampler,
    RenderPass,
    PipelineLayout,
    Pipeline,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    Framebuffer,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
    ShaderModule,
    Swapchain,
    Surface,
    PipelineCache,
}

impl ResourceStage {
    pub fn name(self) -> &'static str {
        match self {
            ResourceStage::Buffer => "buffer",
            ResourceStage::Memory => "device memory",
            ResourceStage::Image => "image",
            ResourceStage::ImageView => "image view",
            ResourceStage::Sampler => "sampler",
            ResourceStage::RenderPass => "render pass",
            ResourceStage::PipelineLayout => "pipeline layout",
            ResourceStage::Pipeline => "graphics pipeline",
            ResourceStage::DescriptorSetLayout => "descriptor set layout",
            ResourceStage::DescriptorPool => "descriptor pool",
            ResourceStage::DescriptorSet => "descriptor sets",
            ResourceStage::Framebuffer => "framebuffer",
            ResourceStage::CommandPool => "command pool",
            ResourceStage::CommandBuffer => "command buffer",
            ResourceStage::Semaphore => "semaphore",
            ResourceStage::Fence => "fence",
            ResourceStage::ShaderModule => "shader module",
            ResourceStage::Swapchain => "swapchain",
            ResourceStage::Surface => "surface",
            ResourceStage::PipelineCache => "pipeline cache",
        }
    }
}

impl fmt::Display for ResourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("vulkan loader: {0}")]
    Loader(String),
    #[error("device creation failed: {0}")]
    DeviceCreationFailed(vk::Result),
    #[error("no vulkan device offers graphics + present queues and sampler anisotropy")]
    NoCompatibleDevice,
    #[error("no memory type in mask {type_bits:#x} has {wanted:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        wanted: vk::MemoryPropertyFlags,
    },
    #[error("failed to create {stage}: {result}")]
    ResourceCreationFailed {
        stage: ResourceStage,
        result: vk::Result,
    },
    #[error("{stage} shader compilation failed: {message}")]
    ShaderCompilationFailed { stage: ShaderStage, message: String },
    #[error("no {0} shader bound")]
    MissingShader(ShaderStage),
    #[error("surface reports no formats or present modes")]
    SurfaceIncompatible,
    #[error("swapchain is out of date")]
    SwapchainStale,
    #[error("presentation failed: {0}")]
    PresentationFailed(vk::Result),
    #[error("queue submission failed: {0}")]
    SubmissionFailed(vk::Result),
    #[error("timed out waiting for the fence of frame slot {slot}")]
    FenceTimeout { slot: usize },
    #[error("write of {len} bytes exceeds buffer size {size}")]
    BufferOverflow { len: u64, size: u64 },
    #[error("buffer memory is not host visible")]
    NotHostVisible,
    #[error("buffer used after free")]
    BufferFreed,
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Tags a raw Vulkan result with the object being created.
pub(crate) trait VkResultExt<T> {
    fn stage(self, stage: ResourceStage) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn stage(self, stage: ResourceStage) -> RenderResult<T> {
        self.map_err(|result| RenderError::ResourceCreationFailed { stage, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_tag_lands_in_message() {
        let r: VkResult<()> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = r.stage(ResourceStage::DescriptorPool).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ResourceCreationFailed {
                stage: ResourceStage::DescriptorPool,
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            }
        ));
        assert!(err.to_string().starts_with("failed to create descriptor pool"));
    }

    #[test]
    fn shader_errors_name_the_stage() {
        let err = RenderError::ShaderCompilationFailed {
            stage: ShaderStage::Fragment,
            message: "1 error".into(),
        };
        assert_eq!(err.to_string(), "fragment shader compilation failed: 1 error");
    }
}
