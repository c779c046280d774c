// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub use winit;

use grove_render::{RenderSize, SurfaceProvider};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::debug;
use winit::window::Window;

/// A winit window paired with its last observed drawable size.
pub struct WindowSurface {
    window: Window,
    size: RenderSize,
}

impl WindowSurface {
    pub fn new(window: Window) -> Self {
        let s = window.inner_size();
        Self {
            size: RenderSize::new(s.width, s.height),
            window,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl HasWindowHandle for WindowSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WindowSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl SurfaceProvider for WindowSurface {
    fn size(&self) -> RenderSize {
        self.size
    }

    fn update_dimensions(&mut self) -> RenderSize {
        let s = self.window.inner_size();
        let size = RenderSize::new(s.width, s.height);
        if size != self.size {
            debug!(
                "surface {}x{} -> {}x{}",
                self.size.width, self.size.height, size.width, size.height
            );
            self.size = size;
        }
        size
    }
}
