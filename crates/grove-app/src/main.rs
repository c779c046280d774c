// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod demo;
mod overlay;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use config::{load_cfg, AppCfg};
use demo::Demo;
use grove_core::init_tracing;
use grove_platform::WindowSurface;
use grove_render::{FrameOutcome, Msaa, PresentMode, Renderer, SurfaceProvider};
use grove_render_vk::VkRenderer;
use overlay::{KeyboardControls, StatsOverlay};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use grove_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file with [window], [render] and [scene] tables
    #[arg(long, default_value = "grove.toml")]
    config: PathBuf,
    /// Exit after this many presented frames
    #[arg(long)]
    frames: Option<u64>,
    /// Override present mode: fifo | fifo_relaxed | mailbox | immediate
    #[arg(long)]
    present_mode: Option<String>,
    /// Override MSAA sample count: 1 | 2 | 4 | 8
    #[arg(long)]
    msaa: Option<u32>,
}

fn apply_overrides(cfg: &mut AppCfg, args: &Args) -> Result<()> {
    if let Some(s) = &args.present_mode {
        cfg.render.present_mode =
            PresentMode::parse(s).ok_or_else(|| anyhow!("unknown present mode '{s}'"))?;
    }
    if let Some(n) = args.msaa {
        cfg.render.msaa = Msaa::from_samples(n).ok_or_else(|| anyhow!("unsupported msaa {n}"))?;
    }
    Ok(())
}

struct App {
    cfg: AppCfg,
    frame_limit: Option<u64>,

    surface: Option<WindowSurface>,
    renderer: Option<VkRenderer>,

    demo: Demo,
    overlay: StatsOverlay,
    controls: KeyboardControls,

    presented: u64,
    exiting: bool,
    error: Option<anyhow::Error>,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.error = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // Renderer before window: the surface must not outlive its window.
        self.renderer = None;
        self.surface = None;
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.cfg.window.width,
                self.cfg.window.height,
            ));
        let window = event_loop.create_window(attrs).context("create_window")?;
        let surface = WindowSurface::new(window);

        self.demo.scene.commit().context("initial scene commit")?;
        let renderer = VkRenderer::new(&surface, &self.cfg.render, &self.demo.scene)?;

        info!(
            "grove up: {}x{} present_mode={} msaa=x{}",
            surface.size().width,
            surface.size().height,
            self.cfg.render.present_mode.label(),
            self.cfg.render.msaa.samples()
        );
        self.surface = Some(surface);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        match &event.logical_key {
            Key::Character(c) => match c.as_str() {
                "p" | "P" => self.overlay.cycle_present_mode(),
                "m" | "M" => self.overlay.cycle_msaa(),
                "r" | "R" => {
                    if let Some(r) = &mut self.renderer {
                        if let Err(e) = r.reload_shaders(&self.demo.scene) {
                            // Keep running on the previous shaders.
                            warn!("shader reload failed: {e}");
                        }
                    }
                }
                "+" | "=" => self.controls.nudge(0.25),
                "-" => self.controls.nudge(-0.25),
                _ => {}
            },
            Key::Named(NamedKey::Tab) => {
                self.controls
                    .select_next(self.demo.scene.control_count());
            }
            Key::Named(NamedKey::Enter) => self.controls.press(),
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        // Animate by the last frame's time, measured by the renderer.
        self.controls.begin();
        self.demo.scene.draw_controls(&mut self.controls);
        self.controls.end();
        self.demo.update(renderer.frame_time_ms());

        match renderer.render(&self.demo.scene, &mut self.overlay) {
            Ok(FrameOutcome::Presented) => self.presented += 1,
            Ok(FrameOutcome::Skipped) => {}
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        }

        if self.frame_limit.is_some_and(|n| self.presented >= n) {
            if let Some(r) = &self.renderer {
                let s = r.stats();
                info!(
                    "frame limit reached: submitted={} swapchain_reloads={} scene_reloads={} skipped={}",
                    s.frames_submitted, s.swapchain_reloads, s.scene_reloads, s.skipped_frames
                );
            }
            self.shutdown(event_loop);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(s) = &self.surface {
            s.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(s) = &self.surface {
            if window_id != s.window().id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(_) => {
                if let (Some(surface), Some(renderer)) = (&mut self.surface, &mut self.renderer) {
                    let size = surface.update_dimensions();
                    renderer.resize(size);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => self.on_key(&event),

            WindowEvent::RedrawRequested => {
                if !self.exiting {
                    self.redraw(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if let Some(s) = &self.surface {
            s.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    apply_overrides(&mut cfg, &args)?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        demo: Demo::new(&cfg.scene),
        cfg,
        frame_limit: args.frames,
        surface: None,
        renderer: None,
        overlay: StatsOverlay::new(Duration::from_secs(1)),
        controls: KeyboardControls::default(),
        presented: 0,
        exiting: false,
        error: None,
    };

    event_loop.run_app(&mut app)?;
    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from(["grove", "--present-mode", "mailbox", "--msaa", "2"]);
        let mut cfg = AppCfg::default();
        apply_overrides(&mut cfg, &args).unwrap();
        assert_eq!(cfg.render.present_mode, PresentMode::Mailbox);
        assert_eq!(cfg.render.msaa, Msaa::X2);
    }

    #[test]
    fn bad_overrides_are_errors() {
        let args = Args::parse_from(["grove", "--msaa", "3"]);
        assert!(apply_overrides(&mut AppCfg::default(), &args).is_err());
        let args = Args::parse_from(["grove", "--present-mode", "vsync"]);
        assert!(apply_overrides(&mut AppCfg::default(), &args).is_err());
    }
}
