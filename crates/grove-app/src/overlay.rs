// SPDX-License-Identifier: CEPL-1.0
use grove_render::{Msaa, Overlay, OverlayFrame, OverlayRequests, OverlayTarget, PresentMode};
use grove_scene::ControlSink;
use std::time::{Duration, Instant};
use tracing::info;

/// Logs frame stats once per interval and forwards picker requests made from
/// the keyboard.
pub struct StatsOverlay {
    interval: Duration,
    last_log: Option<Instant>,
    pending: OverlayRequests,
    present_mode: Option<PresentMode>,
    msaa: Option<(Msaa, Msaa)>,
}

impl StatsOverlay {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_log: None,
            pending: OverlayRequests::default(),
            present_mode: None,
            msaa: None,
        }
    }

    /// Picks the present mode after the one currently in use.
    pub fn cycle_present_mode(&mut self) {
        if let Some(current) = self.present_mode {
            self.pending.present_mode = Some(current.next());
        }
    }

    pub fn cycle_msaa(&mut self) {
        if let Some((current, max)) = self.msaa {
            self.pending.msaa = Some(current.next_up_to(max));
        }
    }
}

impl Overlay for StatsOverlay {
    fn draw(&mut self, frame: &OverlayFrame<'_>, _target: OverlayTarget) -> OverlayRequests {
        self.present_mode = Some(frame.present_mode);
        self.msaa = Some((frame.msaa, frame.max_msaa));

        let now = Instant::now();
        if self.last_log.map_or(true, |t| now.duration_since(t) >= self.interval) {
            self.last_log = Some(now);
            let cam = frame.camera_position;
            info!(
                "[{}] frame {} {:.2} ms ({:.0} fps) objects={} camera=({:.2}, {:.2}, {:.2}) {} msaa x{} {}x{}",
                frame.scene_name,
                frame.frame_index,
                frame.frame_time_ms,
                frame.fps,
                frame.object_count,
                cam.x,
                cam.y,
                cam.z,
                frame.present_mode.label(),
                frame.msaa.samples(),
                frame.extent.width,
                frame.extent.height
            );
        }
        std::mem::take(&mut self.pending)
    }
}

/// Keyboard-driven stand-in for slider widgets: one slider is selected at a
/// time and nudged by a pending step.
#[derive(Default)]
pub struct KeyboardControls {
    selected: usize,
    cursor: usize,
    step: f32,
    press: bool,
}

impl KeyboardControls {
    pub fn select_next(&mut self, count: usize) {
        self.selected = (self.selected + 1) % count.max(1);
    }

    pub fn nudge(&mut self, step: f32) {
        self.step += step;
    }

    pub fn press(&mut self) {
        self.press = true;
    }

    /// Call before each `Scene::draw_controls` pass.
    pub fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Call after the pass; unconsumed input is dropped.
    pub fn end(&mut self) {
        self.step = 0.0;
        self.press = false;
    }
}

impl ControlSink for KeyboardControls {
    fn slider_f32(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool {
        let mine = self.cursor == self.selected;
        self.cursor += 1;
        if !mine || self.step == 0.0 {
            return false;
        }
        let before = *value;
        *value = (*value + self.step).max(min).min(max);
        info!("{label}: {:.2}", *value);
        *value != before
    }

    fn button(&mut self, _label: &str) -> bool {
        let mine = self.cursor == self.selected;
        self.cursor += 1;
        mine && self.press
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_math::Vec3;
    use grove_render::RenderSize;

    fn frame() -> OverlayFrame<'static> {
        OverlayFrame {
            scene_name: "t",
            frame_index: 0,
            frame_time_ms: 16.0,
            fps: 60.0,
            object_count: 2,
            camera_position: Vec3::ZERO,
            present_mode: PresentMode::Fifo,
            msaa: Msaa::X4,
            max_msaa: Msaa::X8,
            extent: RenderSize::new(800, 600),
        }
    }

    #[test]
    fn picker_requests_are_handed_out_once() {
        let mut o = StatsOverlay::new(Duration::from_secs(1));
        o.cycle_present_mode();
        assert!(o.draw(&frame(), OverlayTarget::default()).is_empty());

        o.cycle_present_mode();
        o.cycle_msaa();
        let r = o.draw(&frame(), OverlayTarget::default());
        assert_eq!(r.present_mode, Some(PresentMode::FifoRelaxed));
        assert_eq!(r.msaa, Some(Msaa::X8));
        assert!(o.draw(&frame(), OverlayTarget::default()).is_empty());
    }

    #[test]
    fn msaa_picker_wraps_at_the_device_cap() {
        let mut o = StatsOverlay::new(Duration::from_secs(1));
        let capped = OverlayFrame {
            max_msaa: Msaa::X4,
            ..frame()
        };
        o.draw(&capped, OverlayTarget::default());
        o.cycle_msaa();
        let r = o.draw(&capped, OverlayTarget::default());
        assert_eq!(r.msaa, Some(Msaa::X1));

        let at_x1 = OverlayFrame {
            msaa: Msaa::X1,
            ..capped
        };
        o.draw(&at_x1, OverlayTarget::default());
        o.cycle_msaa();
        assert_eq!(o.draw(&at_x1, OverlayTarget::default()).msaa, Some(Msaa::X2));
    }

    #[test]
    fn only_the_selected_slider_moves() {
        let mut k = KeyboardControls::default();
        k.select_next(2);
        k.nudge(0.5);
        k.begin();
        let (mut a, mut b) = (1.0, 1.0);
        assert!(!k.slider_f32("a", &mut a, 0.0, 5.0));
        assert!(k.slider_f32("b", &mut b, 0.0, 5.0));
        k.end();
        assert_eq!((a, b), (1.0, 1.5));

        k.begin();
        assert!(!k.slider_f32("a", &mut a, 0.0, 5.0));
        assert!(!k.slider_f32("b", &mut b, 0.0, 5.0));
    }
}
