// SPDX-License-Identifier: CEPL-1.0
//! Frame timing for the render loop and the diagnostics overlay.

use std::time::{Duration, Instant};

/// Measures per-frame delta and a rolling frames-per-second figure.
///
/// The FPS value is recomputed once per `window` (one second by default) so
/// that logging and overlays don't flicker every frame.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    last_delta: Duration,
    frames: u64,

    window: Duration,
    window_start: Instant,
    window_frames: u32,
    fps: f32,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            last_delta: Duration::ZERO,
            frames: 0,
            window,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Marks the end of a frame and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.last_delta = delta;
        self.frames += 1;
        self.window_frames += 1;

        let in_window = now.saturating_duration_since(self.window_start);
        if in_window >= self.window {
            self.fps = self.window_frames as f32 / in_window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
        }
        delta
    }

    pub fn frame_time(&self) -> Duration {
        self.last_delta
    }

    pub fn frame_time_ms(&self) -> f32 {
        self.last_delta.as_secs_f32() * 1000.0
    }

    /// Frames per second over the last completed window; 0 until one has elapsed.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_reports_delta_and_counts_frames() {
        let mut t = FrameTimer::new();
        let base = t.last_tick;
        let d = t.tick_at(base + Duration::from_millis(16));
        assert_eq!(d, Duration::from_millis(16));
        assert_eq!(t.frame_count(), 1);
        assert!((t.frame_time_ms() - 16.0).abs() < 0.01);
    }

    #[test]
    fn fps_updates_once_per_window() {
        let mut t = FrameTimer::with_window(Duration::from_millis(100));
        let base = t.last_tick;
        for i in 1..=9 {
            t.tick_at(base + Duration::from_millis(10 * i));
        }
        assert_eq!(t.fps(), 0.0);
        t.tick_at(base + Duration::from_millis(100));
        assert!((t.fps() - 100.0).abs() < 0.5, "fps = {}", t.fps());
    }

    #[test]
    fn clock_going_backwards_saturates() {
        let mut t = FrameTimer::new();
        let base = t.last_tick;
        t.tick_at(base + Duration::from_millis(5));
        assert_eq!(t.tick_at(base), Duration::ZERO);
    }
}
