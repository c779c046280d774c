// SPDX-License-Identifier: CEPL-1.0
use crate::{Msaa, PresentMode, RenderSize};
use grove_math::Vec3;

/// Diagnostics handed to the overlay once per frame.
#[derive(Clone, Copy, Debug)]
pub struct OverlayFrame<'a> {
    pub scene_name: &'a str,
    pub frame_index: u64,
    pub frame_time_ms: f32,
    pub fps: f32,
    pub object_count: usize,
    pub camera_position: Vec3,
    pub present_mode: PresentMode,
    /// Effective sample count.
    pub msaa: Msaa,
    /// Highest count the device supports.
    pub max_msaa: Msaa,
    pub extent: RenderSize,
}

/// Raw handles of the command buffer being recorded and the active render
/// pass, so an immediate-mode UI backend can append its own draws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayTarget {
    pub command_buffer: u64,
    pub render_pass: u64,
}

/// Changes the overlay wants applied after the frame completes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayRequests {
    pub present_mode: Option<PresentMode>,
    pub msaa: Option<Msaa>,
}

impl OverlayRequests {
    pub fn is_empty(&self) -> bool {
        self.present_mode.is_none() && self.msaa.is_none()
    }
}

/// Drawn inside the scene render pass, after all scene geometry.
pub trait Overlay {
    fn draw(&mut self, frame: &OverlayFrame<'_>, target: OverlayTarget) -> OverlayRequests;
}

pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn draw(&mut self, _frame: &OverlayFrame<'_>, _target: OverlayTarget) -> OverlayRequests {
        OverlayRequests::default()
    }
}
