// SPDX-License-Identifier: CEPL-1.0
use crate::context::{DeviceContext, QueueFamilies};
use crate::device_image::{subresource, DeviceImage, ImageDesc};
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use ash::khr::swapchain;
use ash::vk;
use grove_render::{Msaa, PresentMode, RenderSize};
use tracing::{debug, info};

/// Preferred (format, color space) pairs, best first.
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];

/// sRGB 8-bit formats in nonlinear space first; otherwise whatever the driver
/// lists first. `None` when the surface reports no formats at all.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    PREFERRED_FORMATS
        .iter()
        .find_map(|want| {
            formats.iter().copied().find(|f| {
                f.format == *want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .or_else(|| formats.first().copied())
}

pub fn vk_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    PresentMode::ALL
        .into_iter()
        .find(|m| vk_present_mode(*m) == mode)
}

/// The requested mode when the surface offers it, otherwise the first mode
/// the surface lists.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    wanted: PresentMode,
) -> Option<vk::PresentModeKHR> {
    let want = vk_present_mode(wanted);
    if modes.contains(&want) {
        Some(want)
    } else {
        modes.first().copied()
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum for overlap, capped by the maximum (0 == no max).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Exclusive ownership when one family does both jobs, concurrent otherwise.
pub fn sharing(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.distinct() {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// The requested MSAA level clamped down to what the device supports.
pub fn sample_count(msaa: Msaa, supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    let mut n = msaa.samples();
    while n > 1 {
        let flag = vk::SampleCountFlags::from_raw(n);
        if supported.contains(flag) {
            return flag;
        }
        n /= 2;
    }
    vk::SampleCountFlags::TYPE_1
}

/// `msaa` clamped to what `supported` allows.
pub fn effective_msaa(msaa: Msaa, supported: vk::SampleCountFlags) -> Msaa {
    Msaa::from_samples(sample_count(msaa, supported).as_raw()).unwrap_or(Msaa::X1)
}

/// The effective count to switch to, or `None` when `requested` clamps back
/// onto `current`.
pub fn msaa_change(
    current: Msaa,
    requested: Msaa,
    supported: vk::SampleCountFlags,
) -> Option<Msaa> {
    let target = effective_msaa(requested, supported);
    (target != current).then_some(target)
}

/// What a (re)build should target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainRequest {
    pub size: RenderSize,
    pub present_mode: PresentMode,
    pub samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,
}

/// The swapchain plus every per-image and size-dependent object: views,
/// depth attachment, MSAA color target and framebuffers.
pub struct Swapchain {
    device: ash::Device,
    loader: swapchain::Device,
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<DeviceImage>,
    color: Option<DeviceImage>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// # Safety
    /// `ctx` must have been created with a surface and outlive the swapchain.
    pub unsafe fn new(ctx: &DeviceContext, req: SwapchainRequest) -> RenderResult<Self> {
        let loader = ctx
            .swapchain_loader()
            .ok_or(RenderError::SurfaceIncompatible)?
            .clone();
        let mut sc = Self {
            device: ctx.device().clone(),
            loader,
            handle: vk::SwapchainKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            samples: vk::SampleCountFlags::TYPE_1,
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            color: None,
            framebuffers: Vec::new(),
        };
        unsafe { sc.recreate(ctx, req) }?;
        Ok(sc)
    }

    /// Rebuilds against the surface's current state. The old swapchain is
    /// handed to the driver for resource reuse and destroyed afterwards.
    /// Framebuffers must be rebuilt with `build_framebuffers` before use.
    ///
    /// # Safety
    /// The device must be idle with respect to every image of this swapchain.
    //
    // STRICT ORDER (recreate):
    // 1) framebuffers, attachments, views (they reference the old images)
    // 2) new swapchain with old_swapchain set
    // 3) destroy the old handle
    // 4) views, depth, msaa color for the new images
    pub unsafe fn recreate(&mut self, ctx: &DeviceContext, req: SwapchainRequest) -> RenderResult<()> {
        let (surf_i, surface) = ctx.surface().ok_or(RenderError::SurfaceIncompatible)?;
        let phys = ctx.physical_device();

        let (caps, formats, modes) = unsafe {
            (
                surf_i
                    .get_physical_device_surface_capabilities(phys, surface)
                    .stage(ResourceStage::Surface)?,
                surf_i
                    .get_physical_device_surface_formats(phys, surface)
                    .stage(ResourceStage::Surface)?,
                surf_i
                    .get_physical_device_surface_present_modes(phys, surface)
                    .stage(ResourceStage::Surface)?,
            )
        };
        let format = choose_surface_format(&formats).ok_or(RenderError::SurfaceIncompatible)?;
        let present_mode =
            choose_present_mode(&modes, req.present_mode).ok_or(RenderError::SurfaceIncompatible)?;
        let extent = choose_extent(&caps, req.size);
        if extent.width == 0 || extent.height == 0 {
            // Minimized: keep the old swapchain until the surface has area again.
            return Err(RenderError::SwapchainStale);
        }
        let min_count = choose_image_count(&caps);

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };
        let (sharing_mode, family_indices) = sharing(ctx.queue_families());

        unsafe { self.destroy_targets() };

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: min_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: self.handle,
            ..Default::default()
        };
        let created = unsafe { self.loader.create_swapchain(&info, None) };
        let old = std::mem::replace(&mut self.handle, vk::SwapchainKHR::null());
        if old != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old, None) };
        }
        self.handle = created.stage(ResourceStage::Swapchain)?;
        self.images =
            unsafe { self.loader.get_swapchain_images(self.handle) }.stage(ResourceStage::Swapchain)?;
        self.format = format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.samples = req.samples;

        for &image in &self.images {
            let ci = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: format.format,
                subresource_range: subresource(vk::ImageAspectFlags::COLOR),
                ..Default::default()
            };
            let view = unsafe { self.device.create_image_view(&ci, None) }
                .stage(ResourceStage::ImageView)?;
            self.views.push(view);
        }

        self.depth = Some(unsafe {
            DeviceImage::new(
                ctx,
                ImageDesc {
                    extent,
                    format: req.depth_format,
                    usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    aspect: vk::ImageAspectFlags::DEPTH,
                    samples: req.samples,
                },
            )
        }?);
        if req.samples != vk::SampleCountFlags::TYPE_1 {
            self.color = Some(unsafe {
                DeviceImage::new(
                    ctx,
                    ImageDesc {
                        extent,
                        format: format.format,
                        usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                            | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                        aspect: vk::ImageAspectFlags::COLOR,
                        samples: req.samples,
                    },
                )
            }?);
        }

        info!(
            "swapchain: format={:?}/{:?} present_mode={:?} extent={}x{} images={} (min {}) samples={:?}",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            self.images.len(),
            min_count,
            req.samples
        );
        Ok(())
    }

    /// One framebuffer per swapchain image, attachments ordered
    /// [color (msaa target or swapchain view), resolve (msaa only), depth].
    ///
    /// # Safety
    /// `render_pass` must have been built for this swapchain's targets.
    pub unsafe fn build_framebuffers(&mut self, render_pass: vk::RenderPass) -> RenderResult<()> {
        unsafe { self.destroy_framebuffers() };
        let depth = self.depth.as_ref().map(DeviceImage::view).unwrap_or_default();
        for &view in &self.views {
            let attachments: Vec<vk::ImageView> = match &self.color {
                Some(color) => vec![color.view(), view, depth],
                None => vec![view, depth],
            };
            let ci = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { self.device.create_framebuffer(&ci, None) }
                .stage(ResourceStage::Framebuffer)?;
            self.framebuffers.push(fb);
        }
        debug!("{} framebuffers built", self.framebuffers.len());
        Ok(())
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, image: u32) -> vk::Framebuffer {
        self.framebuffers[image as usize]
    }

    unsafe fn destroy_framebuffers(&mut self) {
        for fb in self.framebuffers.drain(..) {
            unsafe { self.device.destroy_framebuffer(fb, None) };
        }
    }

    unsafe fn destroy_targets(&mut self) {
        unsafe {
            self.destroy_framebuffers();
            self.color = None;
            self.depth = None;
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
        }
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.destroy_targets();
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
            }
        }
    }
}
