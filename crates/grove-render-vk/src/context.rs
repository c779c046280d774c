// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical-device choice and the logical device.

use crate::debug::{DebugMessenger, VALIDATION_LAYER};
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn distinct(&self) -> bool {
        self.graphics != self.present
    }

    /// One entry per distinct family, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.distinct() {
            vec![self.graphics, self.present]
        } else {
            vec![self.graphics]
        }
    }
}

/// Prefers a single family that can both draw and present; otherwise pairs
/// the first graphics family with the first present-capable one.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let graphics = |i: usize| {
        families[i].queue_count > 0
            && families[i].queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    if let Some(i) = (0..families.len()).find(|&i| graphics(i) && supports_present(i as u32)) {
        return Some(QueueFamilies {
            graphics: i as u32,
            present: i as u32,
        });
    }
    let g = (0..families.len()).find(|&i| graphics(i))?;
    let p = (0..families.len() as u32).find(|&i| supports_present(i))?;
    Some(QueueFamilies {
        graphics: g as u32,
        present: p,
    })
}

fn device_rank(kind: vk::PhysicalDeviceType) -> u32 {
    match kind {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

/// Depth formats in preference order.
pub const DEPTH_CANDIDATES: [vk::Format; 4] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

pub fn first_depth_format(supports: impl Fn(vk::Format) -> bool) -> Option<vk::Format> {
    DEPTH_CANDIDATES.into_iter().find(|&f| supports(f))
}

/// Capabilities the renderer reads after device selection.
#[derive(Clone, Copy, Debug)]
pub struct DeviceLimits {
    pub max_sampler_anisotropy: f32,
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    /// Sample counts usable for both colour and depth attachments.
    pub framebuffer_samples: vk::SampleCountFlags,
}

struct SurfaceContext {
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

/// Owns everything that lives at instance scope and tears it down in order:
/// surface, debug messenger, then the instance itself.
struct InstanceContext {
    entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface: Option<SurfaceContext>,
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some(s) = &self.surface {
                s.loader.destroy_surface(s.handle, None);
            }
            if let Some(d) = &self.debug {
                d.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

pub struct DeviceContext {
    phys: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory: vk::PhysicalDeviceMemoryProperties,
    limits: DeviceLimits,
    families: QueueFamilies,

    device: ash::Device,
    swapchain_loader: Option<swapchain::Device>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,

    // Dropped after `device` is destroyed in `Drop`.
    inst: InstanceContext,
}

impl DeviceContext {
    /// # Safety
    /// The window must outlive the returned context.
    //
    // STRICT ORDER:
    // 1) instance with WSI (+ debug) extensions
    // 2) surface from THIS instance
    // 3) physical device + queue families checked against the surface
    // 4) logical device with one queue per distinct family
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> RenderResult<Self> {
        let display_raw = display
            .display_handle()
            .map_err(|e| RenderError::Loader(e.to_string()))?
            .as_raw();
        let window_raw = window
            .window_handle()
            .map_err(|e| RenderError::Loader(e.to_string()))?
            .as_raw();

        let mut inst = unsafe { create_instance(Some(display_raw), validation) }?;
        let handle = unsafe {
            ash_window::create_surface(&inst.entry, &inst.instance, display_raw, window_raw, None)
        }
        .stage(ResourceStage::Surface)?;
        inst.surface = Some(SurfaceContext {
            loader: surface::Instance::new(&inst.entry, &inst.instance),
            handle,
        });

        unsafe { Self::with_instance(inst) }
    }

    /// A context without a surface, for off-screen work and tests.
    ///
    /// # Safety
    /// Same requirements as any raw Vulkan usage: single-threaded access.
    pub unsafe fn headless(validation: bool) -> RenderResult<Self> {
        let inst = unsafe { create_instance(None, validation) }?;
        unsafe { Self::with_instance(inst) }
    }

    unsafe fn with_instance(inst: InstanceContext) -> RenderResult<Self> {
        let (phys, families) = unsafe { select_physical_device(&inst) }?;
        let instance = &inst.instance;

        let properties = unsafe { instance.get_physical_device_properties(phys) };
        let memory = unsafe { instance.get_physical_device_memory_properties(phys) };
        let features = unsafe { instance.get_physical_device_features(phys) };
        let limits = DeviceLimits {
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            sample_rate_shading: features.sample_rate_shading == vk::TRUE,
            framebuffer_samples: properties.limits.framebuffer_color_sample_counts
                & properties.limits.framebuffer_depth_sample_counts,
        };

        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        info!(
            "vk device: {} ({:?}), graphics family {}, present family {}",
            name.to_string_lossy(),
            properties.device_type,
            families.graphics,
            families.present
        );

        let priorities = [1.0_f32];
        let queue_infos: Vec<_> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let enabled = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            sample_rate_shading: if limits.sample_rate_shading {
                vk::TRUE
            } else {
                vk::FALSE
            },
            ..Default::default()
        };

        let has_surface = inst.surface.is_some();
        let exts: Vec<*const c_char> = if has_surface {
            vec![swapchain::NAME.as_ptr()]
        } else {
            Vec::new()
        };

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: exts.len() as u32,
            pp_enabled_extension_names: exts.as_ptr(),
            p_enabled_features: &enabled,
            ..Default::default()
        };
        let device = unsafe { instance.create_device(phys, &dinfo, None) }
            .map_err(RenderError::DeviceCreationFailed)?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = has_surface.then(|| swapchain::Device::new(instance, &device));

        Ok(Self {
            phys,
            properties,
            memory,
            limits,
            families,
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
            inst,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &Instance {
        &self.inst.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Surface loader and handle; `None` for headless contexts.
    pub fn surface(&self) -> Option<(&surface::Instance, vk::SurfaceKHR)> {
        self.inst.surface.as_ref().map(|s| (&s.loader, s.handle))
    }

    pub fn swapchain_loader(&self) -> Option<&swapchain::Device> {
        self.swapchain_loader.as_ref()
    }

    pub fn depth_format(&self) -> vk::Format {
        let instance = &self.inst.instance;
        first_depth_format(|f| {
            let props = unsafe { instance.get_physical_device_format_properties(self.phys, f) };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .unwrap_or(vk::Format::D32_SFLOAT)
    }

    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            warn!("device_wait_idle: {e}");
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
        // `inst` drops next: surface, messenger, instance.
    }
}

unsafe fn create_instance(
    display: Option<RawDisplayHandle>,
    validation: bool,
) -> RenderResult<InstanceContext> {
    let entry = Entry::linked();

    let mut exts: Vec<*const c_char> = match display {
        Some(d) => ash_window::enumerate_required_extensions(d)
            .map_err(|e| RenderError::Loader(format!("enumerate_required_extensions: {e}")))?
            .to_vec(),
        None => Vec::new(),
    };

    let layer_present = validation && {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        layers
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER)
    };
    if validation && !layer_present {
        warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
    }
    let layers: Vec<*const c_char> = if layer_present {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: c"grove".as_ptr(),
        application_version: 0,
        p_engine_name: c"grove".as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(RenderError::DeviceCreationFailed)?;

    let debug = if layer_present {
        unsafe { DebugMessenger::new(&entry, &instance) }
    } else {
        None
    };
    let validation = debug.is_some();
    debug!("vk instance created (validation={})", validation);

    Ok(InstanceContext {
        entry,
        instance,
        debug,
        surface: None,
    })
}

unsafe fn select_physical_device(
    inst: &InstanceContext,
) -> RenderResult<(vk::PhysicalDevice, QueueFamilies)> {
    let instance = &inst.instance;
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(RenderError::DeviceCreationFailed)?;

    let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilies)> = None;
    for pd in devices {
        let features = unsafe { instance.get_physical_device_features(pd) };
        if features.sampler_anisotropy != vk::TRUE {
            continue;
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(pd) };
        let picked = match &inst.surface {
            Some(s) => {
                if !unsafe { has_swapchain_extension(instance, pd) } {
                    continue;
                }
                pick_queue_families(&families, |i| unsafe {
                    s.loader
                        .get_physical_device_surface_support(pd, i, s.handle)
                        .unwrap_or(false)
                })
            }
            None => pick_queue_families(&families, |_| true),
        };
        let Some(picked) = picked else {
            continue;
        };

        let props = unsafe { instance.get_physical_device_properties(pd) };
        let rank = device_rank(props.device_type);
        if best.as_ref().map_or(true, |(r, _, _)| rank > *r) {
            best = Some((rank, pd, picked));
        }
    }

    best.map(|(_, pd, f)| (pd, f))
        .ok_or(RenderError::NoCompatibleDevice)
}

unsafe fn has_swapchain_extension(instance: &Instance, pd: vk::PhysicalDevice) -> bool {
    unsafe { instance.enumerate_device_extension_properties(pd) }
        .unwrap_or_default()
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == swapchain::NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_one_family_for_both_roles() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        let picked = pick_queue_families(&fams, |i| i != 0).unwrap();
        assert_eq!(picked, QueueFamilies { graphics: 2, present: 2 });
        assert_eq!(picked.unique(), vec![2]);
    }

    #[test]
    fn splits_families_when_needed() {
        let fams = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let picked = pick_queue_families(&fams, |i| i == 1).unwrap();
        assert_eq!(picked, QueueFamilies { graphics: 0, present: 1 });
        assert!(picked.distinct());
        assert_eq!(picked.unique(), vec![0, 1]);
    }

    #[test]
    fn no_graphics_or_no_present_fails() {
        let fams = [family(vk::QueueFlags::COMPUTE)];
        assert!(pick_queue_families(&fams, |_| true).is_none());
        let fams = [family(vk::QueueFlags::GRAPHICS)];
        assert!(pick_queue_families(&fams, |_| false).is_none());
    }

    #[test]
    fn depth_format_falls_through_candidates() {
        let only_d24 = |f: vk::Format| f == vk::Format::D24_UNORM_S8_UINT;
        assert_eq!(first_depth_format(only_d24), Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(first_depth_format(|_| true), Some(vk::Format::D32_SFLOAT));
        assert_eq!(first_depth_format(|_| false), None);
    }

    #[test]
    fn discrete_outranks_integrated() {
        assert!(
            device_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
    }
}
