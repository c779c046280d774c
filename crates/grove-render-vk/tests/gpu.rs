// SPDX-License-Identifier: CEPL-1.0
//! Tests against a real device. Run with `cargo test -- --ignored`.
use grove_render::PixelSource;
use grove_render_vk::{
    sampler_anisotropy, vk, CommandPool, DeviceContext, GpuBuffer, GpuTexture, RenderError,
};

fn context() -> DeviceContext {
    unsafe { DeviceContext::headless(false) }.expect("vulkan device")
}

fn uploader(ctx: &DeviceContext) -> CommandPool {
    unsafe {
        CommandPool::new(
            ctx.device(),
            ctx.queue_families().graphics,
            ctx.graphics_queue(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )
    }
    .unwrap()
}

#[test]
#[ignore = "requires a Vulkan device"]
fn host_visible_buffer_round_trips() {
    let ctx = context();
    let pool = uploader(&ctx);
    let mut buf = unsafe {
        GpuBuffer::allocate(
            &ctx,
            64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            false,
        )
    }
    .unwrap();
    let data: Vec<u8> = (0..64).collect();
    unsafe { buf.write(&data, &pool) }.unwrap();
    assert_eq!(unsafe { buf.read(64) }.unwrap(), data);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn staged_device_local_write_round_trips() {
    let ctx = context();
    let pool = uploader(&ctx);
    let data: Vec<u8> = (0..=255).rev().collect();
    let size = data.len() as vk::DeviceSize;

    let mut device_local = unsafe {
        GpuBuffer::allocate(
            &ctx,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
        )
    }
    .unwrap();
    assert!(!device_local.is_host_visible());
    unsafe { device_local.write(&data, &pool) }.unwrap();

    let readback = unsafe {
        GpuBuffer::allocate(
            &ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            false,
        )
    }
    .unwrap();
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    let (src, dst) = (device_local.handle(), readback.handle());
    unsafe {
        pool.one_shot(|d, cmd| {
            d.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
        })
    }
    .unwrap();

    assert_eq!(unsafe { readback.read(data.len()) }.unwrap(), data);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn freed_buffer_rejects_access() {
    let ctx = context();
    let pool = uploader(&ctx);
    let mut buf = unsafe {
        GpuBuffer::allocate(
            &ctx,
            16,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            false,
        )
    }
    .unwrap();
    unsafe { buf.free() };

    assert!(matches!(
        unsafe { buf.write_mapped(&[1; 4]) },
        Err(RenderError::BufferFreed)
    ));
    assert!(matches!(
        unsafe { buf.write(&[1; 4], &pool) },
        Err(RenderError::BufferFreed)
    ));
    assert!(matches!(unsafe { buf.read(4) }, Err(RenderError::BufferFreed)));
}

#[test]
#[ignore = "requires a Vulkan device"]
fn oversized_write_is_rejected() {
    let ctx = context();
    let pool = uploader(&ctx);
    let mut buf = unsafe {
        GpuBuffer::allocate(
            &ctx,
            8,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
        )
    }
    .unwrap();
    assert!(unsafe { buf.write(&[0u8; 16], &pool) }.is_err());
    unsafe { buf.write(&[1u8; 8], &pool) }.unwrap();
}

#[test]
#[ignore = "requires a Vulkan device"]
fn free_twice_is_harmless() {
    let ctx = context();
    let mut buf = unsafe {
        GpuBuffer::allocate(
            &ctx,
            16,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            true,
        )
    }
    .unwrap();
    unsafe {
        buf.free();
        buf.free();
    }
    assert!(buf.is_freed());

    let pool = uploader(&ctx);
    let mut tex =
        unsafe { GpuTexture::upload(&ctx, &pool, &PixelSource::solid(2, 2, [9; 4])) }.unwrap();
    unsafe {
        tex.free();
        tex.free();
    }
}

#[test]
#[ignore = "requires a Vulkan device"]
fn texture_anisotropy_is_clamped_to_device() {
    let ctx = context();
    let pool = uploader(&ctx);
    let tex =
        unsafe { GpuTexture::upload(&ctx, &pool, &PixelSource::solid(4, 4, [255, 0, 0, 255])) }
            .unwrap();
    let limits = ctx.limits();
    assert_eq!(
        tex.anisotropy(),
        sampler_anisotropy(limits.sampler_anisotropy, limits.max_sampler_anisotropy)
    );
    assert_eq!((tex.extent().width, tex.extent().height), (4, 4));
}
