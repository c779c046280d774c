// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderResult, ResourceStage, VkResultExt};
use ash::vk;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn hex_bytes(b: &[u8]) -> String {
    let mut s = String::with_capacity(b.len() * 2);
    for x in b {
        let _ = write!(&mut s, "{:02x}", x);
    }
    s
}

/// Cache file name keyed by everything that invalidates driver blobs.
pub fn pipeline_cache_path(props: &vk::PhysicalDeviceProperties) -> PathBuf {
    PathBuf::from(format!(
        "grove_pipeline_cache_{:04x}_{:04x}_{:08x}_{}.bin",
        props.vendor_id,
        props.device_id,
        props.driver_version,
        hex_bytes(&props.pipeline_cache_uuid)
    ))
}

/// A driver pipeline cache, optionally persisted to disk.
pub struct PipelineCache {
    device: ash::Device,
    handle: vk::PipelineCache,
    path: Option<PathBuf>,
}

impl PipelineCache {
    /// Seeds the cache from `path` when the file exists. With `path == None`
    /// the cache lives in memory only.
    ///
    /// # Safety
    /// Must be dropped before `device`.
    pub unsafe fn new(device: &ash::Device, path: Option<PathBuf>) -> RenderResult<Self> {
        let data = path.as_deref().and_then(|p| fs::read(p).ok());
        let (p_initial_data, initial_data_size) = match &data {
            Some(bytes) => (bytes.as_ptr().cast(), bytes.len()),
            None => (std::ptr::null(), 0),
        };
        let ci = vk::PipelineCacheCreateInfo {
            s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
            initial_data_size,
            p_initial_data,
            ..Default::default()
        };
        let handle = unsafe { device.create_pipeline_cache(&ci, None) }
            .stage(ResourceStage::PipelineCache)?;
        debug!(
            "pipeline cache {:?}: seeded with {} B",
            path,
            initial_data_size
        );
        Ok(Self {
            device: device.clone(),
            handle,
            path,
        })
    }

    pub fn handle(&self) -> vk::PipelineCache {
        self.handle
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the cache back to disk. Failures are logged and ignored; some
    /// drivers refuse to export an empty cache.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        match unsafe { self.device.get_pipeline_cache_data(self.handle) } {
            Ok(bytes) => {
                if let Some(parent) = path.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                match fs::write(path, &bytes) {
                    Ok(()) => debug!("pipeline cache saved: {:?} ({} B)", path, bytes.len()),
                    Err(e) => warn!("pipeline cache save {:?}: {e}", path),
                }
            }
            Err(e) => debug!("pipeline cache export skipped: {e}"),
        }
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline_cache(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_encodes_device_identity() {
        let props = vk::PhysicalDeviceProperties {
            vendor_id: 0x10de,
            device_id: 0x2484,
            driver_version: 0x0123_4567,
            pipeline_cache_uuid: [0xab; vk::UUID_SIZE],
            ..Default::default()
        };
        let name = pipeline_cache_path(&props);
        let name = name.to_string_lossy();
        assert!(name.starts_with("grove_pipeline_cache_10de_2484_01234567_abab"));
        assert!(name.ends_with(".bin"));
        assert_eq!(name.len(), "grove_pipeline_cache_10de_2484_01234567_".len() + 32 + 4);
    }
}
