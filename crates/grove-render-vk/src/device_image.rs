// SPDX-License-Identifier: CEPL-1.0
use crate::context::DeviceContext;
use crate::error::{RenderResult, ResourceStage, VkResultExt};
use crate::memory::memory_type_for;
use ash::vk;

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub samples: vk::SampleCountFlags,
}

/// Device-local 2D image with one mip level and a matching view.
/// Used for sampled textures and for depth / multisample attachments.
pub struct DeviceImage {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
}

impl DeviceImage {
    /// # Safety
    /// Must be destroyed before `ctx`'s device.
    pub unsafe fn new(ctx: &DeviceContext, desc: ImageDesc) -> RenderResult<Self> {
        let device = ctx.device();
        let ici = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: desc.samples,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = unsafe { device.create_image(&ici, None) }.stage(ResourceStage::Image)?;

        let mut out = Self {
            device: device.clone(),
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            desc,
        };

        let req = unsafe { device.get_image_memory_requirements(image) };
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: memory_type_for(
                ctx.memory_properties(),
                req.memory_type_bits,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?,
            ..Default::default()
        };
        out.memory = unsafe { device.allocate_memory(&mai, None) }.stage(ResourceStage::Memory)?;
        unsafe { device.bind_image_memory(image, out.memory, 0) }.stage(ResourceStage::Memory)?;

        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: desc.format,
            subresource_range: subresource(desc.aspect),
            ..Default::default()
        };
        out.view = unsafe { device.create_image_view(&view_ci, None) }.stage(ResourceStage::ImageView)?;
        Ok(out)
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }

    /// # Safety
    /// The GPU must no longer use the image.
    pub unsafe fn destroy(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
            if self.image != vk::Image::null() {
                self.device.destroy_image(self.image, None);
                self.image = vk::Image::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }
}

impl Drop for DeviceImage {
    fn drop(&mut self) {
        unsafe { self.destroy() };
    }
}

pub(crate) fn subresource(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}
