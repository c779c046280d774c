// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use ash::vk;

/// A command pool bound to one queue. Also used for blocking one-shot
/// transfers (staging copies, layout transitions).
pub struct CommandPool {
    device: ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
}

impl CommandPool {
    /// # Safety
    /// `queue` must belong to `queue_family` on `device`.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        queue: vk::Queue,
        flags: vk::CommandPoolCreateFlags,
    ) -> RenderResult<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags,
            ..Default::default()
        };
        let pool = unsafe { device.create_command_pool(&info, None) }.stage(ResourceStage::CommandPool)?;
        Ok(Self {
            device: device.clone(),
            pool,
            queue,
        })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// # Safety
    /// The pool must not be in use on another thread.
    pub unsafe fn allocate(&self, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&info) }.stage(ResourceStage::CommandBuffer)
    }

    /// Records `record` into a fresh command buffer, submits it and blocks
    /// until the queue drains.
    ///
    /// # Safety
    /// Everything `record` references must stay alive until this returns.
    pub unsafe fn one_shot<F>(&self, record: F) -> RenderResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let cmd = unsafe { self.allocate(1) }?[0];
        let result = unsafe { self.submit_and_wait(cmd, record) };
        unsafe { self.device.free_command_buffers(self.pool, &[cmd]) };
        result
    }

    unsafe fn submit_and_wait<F>(&self, cmd: vk::CommandBuffer, record: F) -> RenderResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .begin_command_buffer(cmd, &begin)
                .stage(ResourceStage::CommandBuffer)?;
            record(&self.device, cmd);
            self.device
                .end_command_buffer(cmd)
                .stage(ResourceStage::CommandBuffer)?;

            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), vk::Fence::null())
                .map_err(RenderError::SubmissionFailed)?;
            self.device
                .queue_wait_idle(self.queue)
                .map_err(RenderError::SubmissionFailed)
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Destroying the pool frees every buffer allocated from it.
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}
