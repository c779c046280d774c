// SPDX-License-Identifier: CEPL-1.0
//! Per-frame protocol, independent of the GPU objects it drives.
//!
//! STRICT PER-FRAME ORDER:
//!   1) wait for the ring slot's fence
//!   2) pending swapchain reload, then pending scene reload (a surface with
//!      no area skips the frame and keeps the flag)
//!   3) acquire (stale -> flag + skip, ring does not advance)
//!   4) record, 5) submit, 6) present (stale/suboptimal -> flag)
//!   7) advance the ring
use crate::error::{RenderError, RenderResult};
use crate::sync::RingCursor;
use bitflags::bitflags;
use grove_render::FrameOutcome;
use tracing::{debug, trace};

bitflags! {
    /// Reloads deferred to the start of the next frame. Independent: either,
    /// both or neither may be set. A flag clears only after its reload
    /// succeeded.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PendingReload: u8 {
        const SWAPCHAIN = 1 << 0;
        const SCENE = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image { index: u32, suboptimal: bool },
    /// Out of date; nothing was acquired and no semaphore will signal.
    Stale,
    /// Timed out without an image. Try again next frame.
    NotReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presentation {
    Presented,
    /// Out of date or suboptimal. The image was still consumed.
    Stale,
}

/// The GPU-facing steps of one frame. Implemented by the live renderer and
/// by test doubles.
pub trait FrameStages {
    fn wait_fence(&mut self, slot: usize) -> RenderResult<()>;
    fn reload_swapchain(&mut self) -> RenderResult<()>;
    fn reload_scene(&mut self) -> RenderResult<()>;
    fn acquire(&mut self, slot: usize) -> RenderResult<Acquire>;
    /// Resets the slot's fence and command buffer, then records the frame.
    fn record(&mut self, slot: usize, image: u32) -> RenderResult<()>;
    fn submit(&mut self, slot: usize) -> RenderResult<()>;
    fn present(&mut self, slot: usize, image: u32) -> RenderResult<Presentation>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_submitted: u64,
    pub swapchain_reloads: u64,
    pub scene_reloads: u64,
    pub skipped_frames: u64,
}

pub struct FrameDriver {
    cursor: RingCursor,
    pending: PendingReload,
    stats: FrameStats,
}

impl FrameDriver {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            cursor: RingCursor::new(frames_in_flight),
            pending: PendingReload::empty(),
            stats: FrameStats::default(),
        }
    }

    pub fn request(&mut self, reload: PendingReload) {
        if !self.pending.contains(reload) {
            debug!("deferred reload requested: {:?}", reload);
        }
        self.pending |= reload;
    }

    pub fn pending(&self) -> PendingReload {
        self.pending
    }

    pub fn slot(&self) -> usize {
        self.cursor.slot()
    }

    pub fn frame(&self) -> u64 {
        self.cursor.frame()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.cursor.len()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Counts a frame the caller decided not to attempt (e.g. minimized).
    pub fn skip(&mut self) -> FrameOutcome {
        self.stats.skipped_frames += 1;
        FrameOutcome::Skipped
    }

    /// Runs one frame. Recoverable staleness becomes a pending reload and an
    /// `Ok(Skipped)` or `Ok(Presented)`; every other failure propagates and
    /// leaves the ring where it was.
    pub fn run_frame(&mut self, stages: &mut dyn FrameStages) -> RenderResult<FrameOutcome> {
        let slot = self.cursor.slot();
        stages.wait_fence(slot)?;

        if self.pending.contains(PendingReload::SWAPCHAIN) {
            match stages.reload_swapchain() {
                Ok(()) => {}
                Err(RenderError::SwapchainStale) => {
                    debug!("surface has no area; swapchain reload deferred");
                    return Ok(self.skip());
                }
                Err(e) => return Err(e),
            }
            self.pending.remove(PendingReload::SWAPCHAIN);
            self.stats.swapchain_reloads += 1;
        }
        if self.pending.contains(PendingReload::SCENE) {
            stages.reload_scene()?;
            self.pending.remove(PendingReload::SCENE);
            self.stats.scene_reloads += 1;
        }

        let (image, suboptimal) = match stages.acquire(slot)? {
            Acquire::Image { index, suboptimal } => (index, suboptimal),
            Acquire::Stale => {
                self.request(PendingReload::SWAPCHAIN);
                return Ok(self.skip());
            }
            Acquire::NotReady => return Ok(self.skip()),
        };

        stages.record(slot, image)?;
        stages.submit(slot)?;
        self.stats.frames_submitted += 1;

        let presented = stages.present(slot, image)?;
        if suboptimal || presented == Presentation::Stale {
            self.request(PendingReload::SWAPCHAIN);
        }

        trace!("frame {} slot {} image {}", self.cursor.frame(), slot, image);
        self.cursor.advance();
        Ok(FrameOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::collections::VecDeque;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        ReloadSwapchain,
        ReloadScene,
        Acquire(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
    }

    /// Records every call; scripted results are consumed front to back and
    /// default to success. Tracks fences to count frames in flight.
    #[derive(Default)]
    struct Mock {
        calls: Vec<Call>,
        acquires: VecDeque<RenderResult<Acquire>>,
        presents: VecDeque<Presentation>,
        swapchain_failures: usize,
        swapchain_stale: usize,
        submit_failures: usize,
        images: u32,
        next_image: u32,
        unsignaled: Vec<usize>,
        max_in_flight: usize,
    }

    impl Mock {
        fn new() -> Self {
            Self {
                images: 3,
                ..Default::default()
            }
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }
    }

    impl FrameStages for Mock {
        fn wait_fence(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Wait(slot));
            self.unsignaled.retain(|s| *s != slot);
            Ok(())
        }

        fn reload_swapchain(&mut self) -> RenderResult<()> {
            self.calls.push(Call::ReloadSwapchain);
            if self.swapchain_stale > 0 {
                self.swapchain_stale -= 1;
                return Err(RenderError::SwapchainStale);
            }
            if self.swapchain_failures > 0 {
                self.swapchain_failures -= 1;
                return Err(RenderError::SurfaceIncompatible);
            }
            Ok(())
        }

        fn reload_scene(&mut self) -> RenderResult<()> {
            self.calls.push(Call::ReloadScene);
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> RenderResult<Acquire> {
            self.calls.push(Call::Acquire(slot));
            self.acquires.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.images;
                Ok(Acquire::Image {
                    index,
                    suboptimal: false,
                })
            })
        }

        fn record(&mut self, slot: usize, image: u32) -> RenderResult<()> {
            self.calls.push(Call::Record(slot, image));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Submit(slot));
            if self.submit_failures > 0 {
                self.submit_failures -= 1;
                return Err(RenderError::SubmissionFailed(vk::Result::ERROR_DEVICE_LOST));
            }
            self.unsignaled.push(slot);
            self.max_in_flight = self.max_in_flight.max(self.unsignaled.len());
            Ok(())
        }

        fn present(&mut self, slot: usize, image: u32) -> RenderResult<Presentation> {
            self.calls.push(Call::Present(slot, image));
            Ok(self.presents.pop_front().unwrap_or(Presentation::Presented))
        }
    }

    fn waited_slots(mock: &Mock) -> Vec<usize> {
        mock.calls
            .iter()
            .filter_map(|c| match c {
                Call::Wait(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn ring_cycles_through_slots() {
        let mut driver = FrameDriver::new(3);
        let mut mock = Mock::new();
        for _ in 0..5 {
            assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Presented);
        }
        assert_eq!(waited_slots(&mock), [0, 1, 2, 0, 1]);
        assert_eq!(driver.stats().frames_submitted, 5);
        assert_eq!(driver.frame(), 5);
    }

    #[test]
    fn steps_run_in_protocol_order() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        driver.run_frame(&mut mock).unwrap();
        assert_eq!(
            mock.calls,
            [
                Call::Wait(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0)
            ]
        );
    }

    #[test]
    fn resize_mid_run_reloads_once_and_drops_nothing() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        for i in 0..6 {
            if i == 3 {
                driver.request(PendingReload::SWAPCHAIN);
            }
            assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Presented);
        }
        assert_eq!(mock.count(&Call::ReloadSwapchain), 1);
        assert_eq!(driver.stats().skipped_frames, 0);
        assert_eq!(driver.stats().frames_submitted, 6);
        let reload_at = mock
            .calls
            .iter()
            .position(|c| *c == Call::ReloadSwapchain)
            .unwrap();
        assert_eq!(mock.calls[reload_at - 1], Call::Wait(1));
        assert_eq!(mock.calls[reload_at + 1], Call::Acquire(1));
    }

    #[test]
    fn stale_acquire_skips_without_advancing() {
        let mut driver = FrameDriver::new(3);
        let mut mock = Mock::new();
        mock.acquires.push_back(Ok(Acquire::Stale));

        assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Skipped);
        assert_eq!(driver.slot(), 0);
        assert!(driver.pending().contains(PendingReload::SWAPCHAIN));
        assert_eq!(mock.count(&Call::Submit(0)), 0);

        assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Presented);
        assert_eq!(mock.count(&Call::ReloadSwapchain), 1);
        assert!(driver.pending().is_empty());
        assert_eq!(driver.stats().skipped_frames, 1);
    }

    #[test]
    fn not_ready_skips_without_reload() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        mock.acquires.push_back(Ok(Acquire::NotReady));
        assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Skipped);
        assert!(driver.pending().is_empty());
    }

    #[test]
    fn stale_present_flags_reload_and_still_advances() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        mock.presents.push_back(Presentation::Stale);
        assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Presented);
        assert_eq!(driver.slot(), 1);
        assert_eq!(driver.pending(), PendingReload::SWAPCHAIN);
    }

    #[test]
    fn suboptimal_acquire_renders_then_reloads() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        mock.acquires.push_back(Ok(Acquire::Image {
            index: 2,
            suboptimal: true,
        }));
        assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Presented);
        assert!(mock.calls.contains(&Call::Present(0, 2)));
        assert_eq!(driver.pending(), PendingReload::SWAPCHAIN);
    }

    #[test]
    fn fatal_errors_propagate_without_advancing() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        mock.submit_failures = 1;
        let err = driver.run_frame(&mut mock).unwrap_err();
        assert!(matches!(err, RenderError::SubmissionFailed(_)));
        assert_eq!(driver.slot(), 0);
        assert_eq!(driver.stats().frames_submitted, 0);

        mock.acquires
            .push_back(Err(RenderError::PresentationFailed(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(driver.run_frame(&mut mock).is_err());
        assert_eq!(driver.slot(), 0);
    }

    #[test]
    fn both_reloads_run_swapchain_first() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        driver.request(PendingReload::SCENE);
        driver.request(PendingReload::SWAPCHAIN);
        driver.run_frame(&mut mock).unwrap();
        assert_eq!(
            &mock.calls[..3],
            [Call::Wait(0), Call::ReloadSwapchain, Call::ReloadScene]
        );
        assert!(driver.pending().is_empty());
        assert_eq!(driver.stats().scene_reloads, 1);
    }

    #[test]
    fn failed_reload_keeps_its_flag() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        mock.swapchain_failures = 1;
        driver.request(PendingReload::SWAPCHAIN | PendingReload::SCENE);
        assert!(driver.run_frame(&mut mock).is_err());
        assert_eq!(driver.pending(), PendingReload::SWAPCHAIN | PendingReload::SCENE);
        assert_eq!(mock.count(&Call::ReloadScene), 0);

        driver.run_frame(&mut mock).unwrap();
        assert!(driver.pending().is_empty());
    }

    #[test]
    fn stale_swapchain_reload_skips_and_retries() {
        let mut driver = FrameDriver::new(2);
        let mut mock = Mock::new();
        mock.swapchain_stale = 2;
        driver.request(PendingReload::SWAPCHAIN);

        for _ in 0..2 {
            assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Skipped);
            assert_eq!(driver.pending(), PendingReload::SWAPCHAIN);
            assert_eq!(driver.slot(), 0);
        }
        assert_eq!(mock.count(&Call::Acquire(0)), 0);

        assert_eq!(driver.run_frame(&mut mock).unwrap(), FrameOutcome::Presented);
        assert!(driver.pending().is_empty());
        assert_eq!(driver.stats().swapchain_reloads, 1);
        assert_eq!(driver.stats().skipped_frames, 2);
    }

    #[test]
    fn in_flight_frames_never_exceed_ring() {
        for n in 1..=4 {
            let mut driver = FrameDriver::new(n);
            let mut mock = Mock::new();
            for _ in 0..20 {
                driver.run_frame(&mut mock).unwrap();
            }
            assert!(mock.max_in_flight <= n, "n={n} max={}", mock.max_in_flight);
        }
    }
}
