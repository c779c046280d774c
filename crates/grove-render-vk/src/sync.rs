// SPDX-License-Identifier: CEPL-1.0
use crate::commands::CommandPool;
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use ash::vk;

/// Position in the frames-in-flight ring plus a running frame counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingCursor {
    len: usize,
    slot: usize,
    frame: u64,
}

impl RingCursor {
    pub fn new(len: usize) -> Self {
        Self {
            len: len.max(1),
            slot: 0,
            frame: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of frames completed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn advance(&mut self) {
        self.slot = (self.slot + 1) % self.len;
        self.frame += 1;
    }
}

/// Everything one in-flight frame owns.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// Per-slot semaphores, fences and command buffers. Fences start signaled so
/// the first wait on each slot returns immediately.
pub struct FrameSyncRing {
    device: ash::Device,
    slots: Vec<FrameSlot>,
}

impl FrameSyncRing {
    /// # Safety
    /// `pool` must outlive the ring's use of its command buffers.
    pub unsafe fn new(device: &ash::Device, pool: &CommandPool, frames: usize) -> RenderResult<Self> {
        let frames = frames.max(1);
        let mut ring = Self {
            device: device.clone(),
            slots: Vec::with_capacity(frames),
        };

        let buffers = unsafe { pool.allocate(frames as u32) }?;
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for cmd in buffers {
            ring.slots.push(FrameSlot {
                command_buffer: cmd,
                ..Default::default()
            });
            let last = ring.slots.len() - 1;
            let slot = &mut ring.slots[last];
            unsafe {
                slot.image_available = device
                    .create_semaphore(&sem_ci, None)
                    .stage(ResourceStage::Semaphore)?;
                slot.render_finished = device
                    .create_semaphore(&sem_ci, None)
                    .stage(ResourceStage::Semaphore)?;
                slot.in_flight = device
                    .create_fence(&fence_ci, None)
                    .stage(ResourceStage::Fence)?;
            }
        }
        Ok(ring)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Blocks until the slot's previous submission retired.
    ///
    /// # Safety
    /// The slot's fence must be live.
    pub unsafe fn wait(&self, index: usize, timeout_ns: u64) -> RenderResult<()> {
        let fence = self.slots[index].in_flight;
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RenderError::FenceTimeout { slot: index }),
            Err(e) => Err(RenderError::SubmissionFailed(e)),
        }
    }

    /// Unsignals the fence and resets the command buffer for re-recording.
    ///
    /// # Safety
    /// Only after a successful `wait` on the same slot.
    pub unsafe fn reset(&self, index: usize) -> RenderResult<()> {
        let slot = &self.slots[index];
        unsafe {
            self.device
                .reset_fences(&[slot.in_flight])
                .stage(ResourceStage::Fence)?;
            self.device
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())
                .stage(ResourceStage::CommandBuffer)
        }
    }
}

impl Drop for FrameSyncRing {
    fn drop(&mut self) {
        unsafe {
            let fences: Vec<_> = self
                .slots
                .iter()
                .map(|s| s.in_flight)
                .filter(|f| *f != vk::Fence::null())
                .collect();
            if !fences.is_empty() {
                let _ = self.device.wait_for_fences(&fences, true, u64::MAX);
            }
            for s in &self.slots {
                self.device.destroy_fence(s.in_flight, None);
                self.device.destroy_semaphore(s.render_finished, None);
                self.device.destroy_semaphore(s.image_available, None);
            }
            // Command buffers go back with their pool.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_and_counts() {
        let mut c = RingCursor::new(3);
        let slots: Vec<_> = (0..5)
            .map(|_| {
                let s = c.slot();
                c.advance();
                s
            })
            .collect();
        assert_eq!(slots, [0, 1, 2, 0, 1]);
        assert_eq!(c.frame(), 5);
    }

    #[test]
    fn zero_length_ring_becomes_one() {
        let mut c = RingCursor::new(0);
        c.advance();
        assert_eq!((c.len(), c.slot()), (1, 0));
    }
}
