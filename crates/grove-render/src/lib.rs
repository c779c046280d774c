// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod config;
mod model;
mod overlay;
mod scene;
mod texture;

pub use config::{Msaa, PresentMode, RenderConfig};
pub use model::{Model, Vertex};
pub use overlay::{NoOverlay, Overlay, OverlayFrame, OverlayRequests, OverlayTarget};
pub use scene::{ObjectId, SceneSource};
pub use texture::{PixelSource, TextureSlot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports 0×0; nothing can be presented to it.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A window the renderer can present into.
pub trait SurfaceProvider: HasWindowHandle + HasDisplayHandle {
    /// Last known drawable size in physical pixels.
    fn size(&self) -> RenderSize;
    /// Re-reads the size from the windowing system and returns it.
    fn update_dimensions(&mut self) -> RenderSize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened to a frame request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Commands were submitted and the image queued for presentation.
    Presented,
    /// Nothing was drawn: the window is minimized or the swapchain went stale.
    Skipped,
}

pub trait Renderer {
    fn new(
        surface: &dyn SurfaceProvider,
        config: &RenderConfig,
        scene: &dyn SceneSource,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(
        &mut self,
        scene: &dyn SceneSource,
        overlay: &mut dyn Overlay,
    ) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn request_scene_reload(&mut self);
    fn set_present_mode(&mut self, _mode: PresentMode) {}
    fn set_msaa(&mut self, _msaa: Msaa) {}
}
