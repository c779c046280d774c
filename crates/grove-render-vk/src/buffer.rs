// SPDX-License-Identifier: CEPL-1.0
use crate::commands::CommandPool;
use crate::context::DeviceContext;
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use crate::memory::memory_type_for;
use ash::vk;

/// A buffer plus its dedicated memory allocation.
///
/// Host-visible buffers are written through a mapping (kept alive when
/// `keep_mapped` is set); device-local ones go through a temporary staging
/// buffer and a blocking copy on the upload queue.
pub struct GpuBuffer {
    device: ash::Device,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
    mapped: *mut u8,
}

impl GpuBuffer {
    /// # Safety
    /// The buffer must be freed (or dropped) before `ctx`'s device.
    pub unsafe fn allocate(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        keep_mapped: bool,
    ) -> RenderResult<Self> {
        unsafe {
            Self::allocate_with(
                ctx.device(),
                ctx.memory_properties(),
                size,
                usage,
                properties,
                keep_mapped,
            )
        }
    }

    unsafe fn allocate_with(
        device: &ash::Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        mut usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        keep_mapped: bool,
    ) -> RenderResult<Self> {
        let host_visible = properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE);
        if keep_mapped && !host_visible {
            return Err(RenderError::NotHostVisible);
        }
        if !host_visible {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }

        // Zero-sized buffers are invalid; round up so empty uploads still work.
        let size = size.max(1);
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&bci, None) }.stage(ResourceStage::Buffer)?;

        // From here on `Drop` releases whatever was created.
        let mut out = Self {
            device: device.clone(),
            memory_props: *memory_props,
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
            properties,
            mapped: std::ptr::null_mut(),
        };

        let req = unsafe { device.get_buffer_memory_requirements(buffer) };
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: memory_type_for(memory_props, req.memory_type_bits, properties)?,
            ..Default::default()
        };
        out.memory = unsafe { device.allocate_memory(&mai, None) }.stage(ResourceStage::Memory)?;
        unsafe { device.bind_buffer_memory(buffer, out.memory, 0) }.stage(ResourceStage::Memory)?;

        if keep_mapped {
            out.mapped = unsafe { out.map() }?;
        }
        Ok(out)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        !self.mapped.is_null()
    }

    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    fn is_coherent(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    fn check_len(&self, len: usize) -> RenderResult<()> {
        if self.is_freed() {
            return Err(RenderError::BufferFreed);
        }
        if len as u64 > self.size {
            return Err(RenderError::BufferOverflow {
                len: len as u64,
                size: self.size,
            });
        }
        Ok(())
    }

    unsafe fn map(&self) -> RenderResult<*mut u8> {
        let ptr = unsafe {
            self.device
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        }
        .stage(ResourceStage::Memory)?;
        Ok(ptr.cast())
    }

    fn whole_range(&self) -> vk::MappedMemoryRange<'static> {
        vk::MappedMemoryRange {
            s_type: vk::StructureType::MAPPED_MEMORY_RANGE,
            memory: self.memory,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        }
    }

    /// Copies `bytes` to the start of the buffer.
    ///
    /// # Safety
    /// The GPU must not be reading the written range.
    pub unsafe fn write(&mut self, bytes: &[u8], uploader: &CommandPool) -> RenderResult<()> {
        self.check_len(bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }
        if self.is_host_visible() {
            unsafe { self.write_mapped(bytes) }
        } else {
            unsafe { self.write_staged(bytes, uploader) }
        }
    }

    /// Direct write through a host mapping.
    ///
    /// # Safety
    /// See [`GpuBuffer::write`].
    pub unsafe fn write_mapped(&mut self, bytes: &[u8]) -> RenderResult<()> {
        if !self.is_host_visible() {
            return Err(RenderError::NotHostVisible);
        }
        self.check_len(bytes.len())?;

        let ptr = if self.mapped.is_null() {
            unsafe { self.map() }?
        } else {
            self.mapped
        };
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            if !self.is_coherent() {
                self.device
                    .flush_mapped_memory_ranges(&[self.whole_range()])
                    .stage(ResourceStage::Memory)?;
            }
            if self.mapped.is_null() {
                self.device.unmap_memory(self.memory);
            }
        }
        Ok(())
    }

    unsafe fn write_staged(&mut self, bytes: &[u8], uploader: &CommandPool) -> RenderResult<()> {
        let mut staging = unsafe {
            Self::allocate_with(
                &self.device,
                &self.memory_props,
                bytes.len() as vk::DeviceSize,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                false,
            )
        }?;
        unsafe { staging.write_mapped(bytes) }?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: bytes.len() as vk::DeviceSize,
        };
        let (src, dst) = (staging.buffer, self.buffer);
        unsafe {
            uploader.one_shot(|d, cmd| {
                d.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
            })
        }
        // `staging` drops here, after the copy has completed.
    }

    /// Reads back the first `len` bytes of a host-visible buffer.
    ///
    /// # Safety
    /// The GPU must have finished writing the range.
    pub unsafe fn read(&self, len: usize) -> RenderResult<Vec<u8>> {
        if !self.is_host_visible() {
            return Err(RenderError::NotHostVisible);
        }
        self.check_len(len)?;

        let ptr = if self.mapped.is_null() {
            unsafe { self.map() }?
        } else {
            self.mapped
        };
        let mut out = vec![0u8; len];
        unsafe {
            if !self.is_coherent() {
                self.device
                    .invalidate_mapped_memory_ranges(&[self.whole_range()])
                    .stage(ResourceStage::Memory)?;
            }
            std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), len);
            if self.mapped.is_null() {
                self.device.unmap_memory(self.memory);
            }
        }
        Ok(out)
    }

    /// Releases the buffer and its memory. Safe to call more than once.
    ///
    /// # Safety
    /// The GPU must no longer use the buffer.
    pub unsafe fn free(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.device.unmap_memory(self.memory);
                self.mapped = std::ptr::null_mut();
            }
            if self.buffer != vk::Buffer::null() {
                self.device.destroy_buffer(self.buffer, None);
                self.buffer = vk::Buffer::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }

    pub fn is_freed(&self) -> bool {
        self.buffer == vk::Buffer::null()
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe { self.free() };
    }
}
