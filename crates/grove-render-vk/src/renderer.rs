// SPDX-License-Identifier: CEPL-1.0
use crate::cache::{pipeline_cache_path, PipelineCache};
use crate::commands::CommandPool;
use crate::context::DeviceContext;
use crate::descriptor::descriptor_index;
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use crate::frame::{Acquire, FrameDriver, FrameStages, FrameStats, PendingReload, Presentation};
use crate::pipeline::{clear_values, Pipeline, PipelineTargets};
use crate::resources::SceneResources;
use crate::swapchain::{
    effective_msaa, msaa_change, present_mode_from_vk, sample_count, Swapchain, SwapchainRequest,
};
use crate::sync::FrameSyncRing;
use anyhow::{Context, Result};
use ash::vk::{self, Handle};
use grove_core::FrameTimer;
use grove_math::{perspective_y_flipped, DEFAULT_FAR, DEFAULT_FOV_Y_DEG, DEFAULT_NEAR};
use grove_render::{
    FrameOutcome, Msaa, Overlay, OverlayFrame, OverlayRequests, OverlayTarget, PresentMode,
    RenderConfig, RenderSize, Renderer, SceneSource, ShaderStage, SurfaceProvider,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

/// Vulkan implementation of [`Renderer`].
///
/// The frame protocol lives in [`FrameDriver`]; everything GPU-side lives in
/// `GpuState`, which the driver reaches through [`FrameStages`].
pub struct VkRenderer {
    driver: FrameDriver,
    gpu: GpuState,
}

// STRICT TEARDOWN ORDER:
// fields drop top to bottom after `Drop::drop` has waited for the device,
// so scene resources and pipeline go first and the device context last.
struct GpuState {
    resources: Option<SceneResources>,
    pipeline: Pipeline,
    swapchain: Swapchain,
    ring: FrameSyncRing,
    _frame_pool: CommandPool,
    uploader: CommandPool,
    cache: PipelineCache,
    ctx: DeviceContext,

    config: RenderConfig,
    size: RenderSize,
    present_mode: PresentMode,
    msaa: Msaa,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
    scene_generation: u64,
    graphics_dirty: bool,
    timer: FrameTimer,
    requests: OverlayRequests,
}

impl VkRenderer {
    /// Brings up device, swapchain, pipeline and the scene's GPU resources.
    /// Any failure aborts the whole init.
    pub fn init(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &RenderConfig,
        scene: &dyn SceneSource,
    ) -> RenderResult<Self> {
        let frames = config.frames_in_flight();

        // STRICT ORDER: locals drop in reverse on early return, which is the
        // teardown order we need.
        unsafe {
            let ctx = DeviceContext::new(window, display, config.validation)?;
            let device = ctx.device();
            let families = ctx.queue_families();

            let cache_path = config
                .pipeline_cache
                .then(|| pipeline_cache_path(ctx.properties()));
            let cache = PipelineCache::new(device, cache_path)?;
            let uploader = CommandPool::new(
                device,
                families.graphics,
                ctx.graphics_queue(),
                vk::CommandPoolCreateFlags::TRANSIENT,
            )?;
            let frame_pool = CommandPool::new(
                device,
                families.graphics,
                ctx.graphics_queue(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?;
            let ring = FrameSyncRing::new(device, &frame_pool, frames)?;

            let depth_format = ctx.depth_format();
            let supported = ctx.limits().framebuffer_samples;
            let msaa = effective_msaa(config.msaa, supported);
            let samples = sample_count(msaa, supported);
            let swapchain = Swapchain::new(
                &ctx,
                SwapchainRequest {
                    size,
                    present_mode: config.present_mode,
                    samples,
                    depth_format,
                },
            )?;

            let mut pipeline = Pipeline::new(device, cache.handle());
            pipeline.bind_shader(scene.vertex_shader(), ShaderStage::Vertex)?;
            pipeline.bind_shader(scene.fragment_shader(), ShaderStage::Fragment)?;

            let resources = SceneResources::load(&ctx, &uploader, scene, frames)?;
            let targets = PipelineTargets {
                color_format: swapchain.format(),
                depth_format,
                samples,
                sample_shading: ctx.limits().sample_rate_shading,
            };
            pipeline.reload(true, targets, &resources.set_resources())?;

            let mut gpu = GpuState {
                resources: Some(resources),
                pipeline,
                swapchain,
                ring,
                _frame_pool: frame_pool,
                uploader,
                cache,
                ctx,
                config: *config,
                size,
                present_mode: config.present_mode,
                msaa,
                samples,
                depth_format,
                scene_generation: scene.generation(),
                graphics_dirty: false,
                timer: FrameTimer::new(),
                requests: OverlayRequests::default(),
            };
            gpu.swapchain.build_framebuffers(gpu.pipeline.render_pass())?;

            info!(
                "renderer ready: frames_in_flight={} samples={:?} depth={:?}",
                frames, samples, depth_format
            );
            Ok(Self {
                driver: FrameDriver::new(frames),
                gpu,
            })
        }
    }

    /// One iteration of the frame loop. Minimized windows and stale
    /// swapchains come back as `Skipped`; anything else failing is fatal.
    pub fn render_frame(
        &mut self,
        scene: &dyn SceneSource,
        overlay: &mut dyn Overlay,
    ) -> RenderResult<FrameOutcome> {
        self.gpu.timer.tick();
        if self.gpu.size.is_empty() {
            return Ok(self.driver.skip());
        }
        if scene.generation() != self.gpu.scene_generation {
            self.driver.request(PendingReload::SCENE);
        }

        let frame_index = self.driver.frame();
        let outcome = self.driver.run_frame(&mut LiveFrame {
            gpu: &mut self.gpu,
            scene,
            overlay,
            frame_index,
        })?;

        let requests = std::mem::take(&mut self.gpu.requests);
        if let Some(mode) = requests.present_mode {
            self.set_present_mode(mode);
        }
        if let Some(msaa) = requests.msaa {
            self.set_msaa(msaa);
        }
        Ok(outcome)
    }

    /// Records the new size; the swapchain follows at the next frame.
    pub fn resize(&mut self, size: RenderSize) {
        if size == self.gpu.size {
            return;
        }
        debug!("resize {}x{}", size.width, size.height);
        self.gpu.size = size;
        self.driver.request(PendingReload::SWAPCHAIN);
    }

    pub fn set_present_mode(&mut self, mode: PresentMode) {
        if mode != self.gpu.present_mode {
            info!("present mode -> {}", mode.label());
            self.gpu.present_mode = mode;
            self.driver.request(PendingReload::SWAPCHAIN);
        }
    }

    /// A new sample count needs new attachments and a new render pass.
    /// Requests above the device limit are clamped; `self.gpu.msaa` always
    /// holds the count actually in use.
    pub fn set_msaa(&mut self, msaa: Msaa) {
        let supported = self.gpu.ctx.limits().framebuffer_samples;
        if let Some(msaa) = msaa_change(self.gpu.msaa, msaa, supported) {
            info!("msaa -> x{}", msaa.samples());
            self.gpu.msaa = msaa;
            self.gpu.graphics_dirty = true;
            self.driver.request(PendingReload::SWAPCHAIN);
        }
    }

    pub fn request_scene_reload(&mut self) {
        self.driver.request(PendingReload::SCENE);
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.gpu.config.clear_color = rgba;
    }

    /// Recompiles both stages from `scene`'s shader paths. On a compile error
    /// the previous modules stay bound and the error is returned; on success
    /// the graphics pipeline is rebuilt at the next frame.
    pub fn reload_shaders(&mut self, scene: &dyn SceneSource) -> RenderResult<()> {
        unsafe { self.gpu.bind_shaders(scene, true) }?;
        self.driver.request(PendingReload::SWAPCHAIN);
        Ok(())
    }

    /// Time between the last two frames, as shown by the overlay.
    pub fn frame_time_ms(&self) -> f32 {
        self.gpu.timer.frame_time_ms()
    }

    pub fn stats(&self) -> FrameStats {
        self.driver.stats()
    }

    /// Ring slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        self.driver.slot()
    }

    pub fn pending_reloads(&self) -> PendingReload {
        self.driver.pending()
    }

    pub fn device(&self) -> &DeviceContext {
        &self.gpu.ctx
    }
}

impl GpuState {
    fn targets(&self) -> PipelineTargets {
        PipelineTargets {
            color_format: self.swapchain.format(),
            depth_format: self.depth_format,
            samples: self.samples,
            sample_shading: self.ctx.limits().sample_rate_shading,
        }
    }

    /// Binds the scene's shaders. Unless `force`, only stages whose path
    /// changed are recompiled.
    unsafe fn bind_shaders(&mut self, scene: &dyn SceneSource, force: bool) -> RenderResult<()> {
        for (stage, path) in [
            (ShaderStage::Vertex, scene.vertex_shader()),
            (ShaderStage::Fragment, scene.fragment_shader()),
        ] {
            if force || self.pipeline.shader_source(stage) != Some(path) {
                unsafe { self.pipeline.bind_shader(path, stage) }?;
                self.graphics_dirty = true;
            }
        }
        Ok(())
    }

    /// Rewrites descriptors for the current resources and, when needed,
    /// rebuilds the graphics pipeline and the framebuffers that use its
    /// render pass.
    unsafe fn relink(&mut self, framebuffers_stale: bool) -> RenderResult<()> {
        let sets = self
            .resources
            .as_ref()
            .map(SceneResources::set_resources)
            .unwrap_or_default();
        let targets = self.targets();
        let rebuilt = unsafe { self.pipeline.reload(self.graphics_dirty, targets, &sets) }?;
        self.graphics_dirty = false;
        if rebuilt || framebuffers_stale {
            unsafe {
                self.swapchain
                    .build_framebuffers(self.pipeline.render_pass())
            }?;
        }
        Ok(())
    }

    fn max_msaa(&self) -> Msaa {
        effective_msaa(Msaa::X8, self.ctx.limits().framebuffer_samples)
    }
}

impl Drop for GpuState {
    fn drop(&mut self) {
        self.ctx.wait_idle();
        self.cache.save();
    }
}

/// One frame's view of the renderer plus the caller's scene and overlay.
struct LiveFrame<'a, 'o> {
    gpu: &'a mut GpuState,
    scene: &'a dyn SceneSource,
    overlay: &'a mut (dyn Overlay + 'o),
    frame_index: u64,
}

impl FrameStages for LiveFrame<'_, '_> {
    fn wait_fence(&mut self, slot: usize) -> RenderResult<()> {
        unsafe { self.gpu.ring.wait(slot, self.gpu.config.fence_timeout_ns()) }
    }

    fn reload_swapchain(&mut self) -> RenderResult<()> {
        let gpu = &mut *self.gpu;
        gpu.ctx.wait_idle();
        gpu.samples = sample_count(gpu.msaa, gpu.ctx.limits().framebuffer_samples);
        unsafe {
            gpu.swapchain.recreate(
                &gpu.ctx,
                SwapchainRequest {
                    size: gpu.size,
                    present_mode: gpu.present_mode,
                    samples: gpu.samples,
                    depth_format: gpu.depth_format,
                },
            )?;
            gpu.relink(true)
        }
    }

    fn reload_scene(&mut self) -> RenderResult<()> {
        let gpu = &mut *self.gpu;
        gpu.ctx.wait_idle();
        unsafe {
            gpu.bind_shaders(self.scene, false)?;
            // Free before loading so both sets never coexist in memory.
            gpu.resources = None;
            gpu.resources = Some(SceneResources::load(
                &gpu.ctx,
                &gpu.uploader,
                self.scene,
                gpu.ring.len(),
            )?);
            gpu.relink(false)?;
        }
        gpu.scene_generation = self.scene.generation();
        info!(
            "scene '{}' reloaded (generation {})",
            self.scene.name(),
            gpu.scene_generation
        );
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RenderResult<Acquire> {
        let gpu = &*self.gpu;
        let semaphore = gpu.ring.slot(slot).image_available;
        match unsafe {
            gpu.swapchain.loader().acquire_next_image(
                gpu.swapchain.handle(),
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        } {
            Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(Acquire::NotReady),
            Err(e) => Err(RenderError::PresentationFailed(e)),
        }
    }

    fn record(&mut self, slot: usize, image: u32) -> RenderResult<()> {
        let gpu = &mut *self.gpu;
        let extent = gpu.swapchain.extent();
        let projection = perspective_y_flipped(
            DEFAULT_FOV_Y_DEG,
            extent.width,
            extent.height,
            DEFAULT_NEAR,
            DEFAULT_FAR,
        );
        let view = self.scene.view_matrix();

        unsafe {
            gpu.ring.reset(slot)?;
            if let Some(res) = gpu.resources.as_mut() {
                res.update_uniforms(slot, self.scene, view, projection)?;
            }

            let device = gpu.ctx.device();
            let cmd = gpu.ring.slot(slot).command_buffer;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            device
                .begin_command_buffer(cmd, &begin)
                .stage(ResourceStage::CommandBuffer)?;

            let clears = clear_values(
                gpu.config.clear_color,
                gpu.samples != vk::SampleCountFlags::TYPE_1,
            );
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: gpu.pipeline.render_pass(),
                framebuffer: gpu.swapchain.framebuffer(image),
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));

            let mut object_count = 0;
            if let Some(res) = gpu.resources.as_ref() {
                if let (Some(vb), Some(ib)) = (res.vertex_buffer(), res.index_buffer()) {
                    device.cmd_bind_pipeline(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        gpu.pipeline.handle(),
                    );
                    device.cmd_bind_vertex_buffers(cmd, 0, &[vb], &[0]);
                    device.cmd_bind_index_buffer(cmd, ib, 0, vk::IndexType::UINT32);

                    for (k, call) in res.draw_list().calls().iter().enumerate() {
                        let set = gpu
                            .pipeline
                            .descriptor_set(descriptor_index(k, slot, res.frames()));
                        device.cmd_bind_descriptor_sets(
                            cmd,
                            vk::PipelineBindPoint::GRAPHICS,
                            gpu.pipeline.layout(),
                            0,
                            &[set],
                            &[],
                        );
                        device.cmd_draw_indexed(
                            cmd,
                            call.index_count,
                            1,
                            call.first_index,
                            call.vertex_offset,
                            0,
                        );
                    }
                    object_count = res.draw_list().len();
                }
            }

            let frame = OverlayFrame {
                scene_name: self.scene.name(),
                frame_index: self.frame_index,
                frame_time_ms: gpu.timer.frame_time_ms(),
                fps: gpu.timer.fps(),
                object_count,
                camera_position: self.scene.camera_position(),
                present_mode: present_mode_from_vk(gpu.swapchain.present_mode())
                    .unwrap_or(gpu.present_mode),
                msaa: gpu.msaa,
                max_msaa: gpu.max_msaa(),
                extent: RenderSize::new(extent.width, extent.height),
            };
            let target = OverlayTarget {
                command_buffer: cmd.as_raw(),
                render_pass: gpu.pipeline.render_pass().as_raw(),
            };
            let requests = self.overlay.draw(&frame, target);
            if !requests.is_empty() {
                gpu.requests = requests;
            }

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .stage(ResourceStage::CommandBuffer)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RenderResult<()> {
        let gpu = &*self.gpu;
        let s = gpu.ring.slot(slot);
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            gpu.ctx.device().queue_submit(
                gpu.ctx.graphics_queue(),
                std::slice::from_ref(&submit),
                s.in_flight,
            )
        }
        .map_err(RenderError::SubmissionFailed)
    }

    fn present(&mut self, slot: usize, image: u32) -> RenderResult<Presentation> {
        let gpu = &*self.gpu;
        let handle = gpu.swapchain.handle();
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &gpu.ring.slot(slot).render_finished,
            swapchain_count: 1,
            p_swapchains: &handle,
            p_image_indices: &image,
            ..Default::default()
        };
        match unsafe {
            gpu.swapchain
                .loader()
                .queue_present(gpu.ctx.present_queue(), &info)
        } {
            Ok(false) => Ok(Presentation::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presentation::Stale),
            Err(e) => Err(RenderError::PresentationFailed(e)),
        }
    }
}

impl Renderer for VkRenderer {
    fn new(
        surface: &dyn SurfaceProvider,
        config: &RenderConfig,
        scene: &dyn SceneSource,
    ) -> Result<Self> {
        let window = surface.window_handle().context("window handle")?;
        let display = surface.display_handle().context("display handle")?;
        VkRenderer::init(&window, &display, surface.size(), config, scene)
            .context("vulkan renderer init")
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        VkRenderer::resize(self, size);
        Ok(())
    }

    fn render(&mut self, scene: &dyn SceneSource, overlay: &mut dyn Overlay) -> Result<FrameOutcome> {
        self.render_frame(scene, overlay)
            .with_context(|| format!("frame {}", self.driver.frame()))
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        VkRenderer::set_clear_color(self, rgba);
    }

    fn request_scene_reload(&mut self) {
        VkRenderer::request_scene_reload(self);
    }

    fn set_present_mode(&mut self, mode: PresentMode) {
        VkRenderer::set_present_mode(self, mode);
    }

    fn set_msaa(&mut self, msaa: Msaa) {
        VkRenderer::set_msaa(self, msaa);
    }
}
