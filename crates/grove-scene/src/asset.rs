// SPDX-License-Identifier: CEPL-1.0
use crate::SceneError;
use grove_render::{Model, PixelSource, TextureSlot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Model and textures attached to one scene object.
#[derive(Clone, Debug, Default)]
pub struct AssetEntry {
    pub model: Model,
    pub textures: BTreeMap<TextureSlot, Texture>,
}

impl AssetEntry {
    pub fn with_model(model: Model) -> Self {
        Self {
            model,
            textures: BTreeMap::new(),
        }
    }

    pub fn set_texture(&mut self, slot: TextureSlot, texture: Texture) {
        self.textures.insert(slot, texture);
    }

    pub(crate) fn load_textures(&mut self) -> Result<(), SceneError> {
        for texture in self.textures.values_mut() {
            texture.load()?;
        }
        Ok(())
    }
}

/// A texture is either generated in memory or decoded lazily from disk on
/// the next scene commit.
#[derive(Clone, Debug)]
pub struct Texture {
    path: Option<PathBuf>,
    pixels: Option<PixelSource>,
}

impl Texture {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            pixels: None,
        }
    }

    pub fn from_pixels(pixels: PixelSource) -> Self {
        Self {
            path: None,
            pixels: Some(pixels),
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::from_pixels(PixelSource::solid(width, height, rgba))
    }

    /// Two-colour checkerboard with square cells of `cell` pixels.
    pub fn checker(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell) + (y / cell)) % 2 == 0;
                pixels.extend_from_slice(if even { &a } else { &b });
            }
        }
        match PixelSource::new(size, size, pixels) {
            Some(p) => Self::from_pixels(p),
            None => Self::solid(size, size, a),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.pixels.is_some()
    }

    pub fn pixels(&self) -> Option<&PixelSource> {
        self.pixels.as_ref()
    }

    /// Decodes the backing file to RGBA8 if that hasn't happened yet.
    pub fn load(&mut self) -> Result<(), SceneError> {
        if self.pixels.is_some() {
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Ok(());
        };

        let rgba = image::open(path)
            .map_err(|source| SceneError::ImageDecode {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = PixelSource::new(width, height, rgba.into_raw()).ok_or_else(|| {
            SceneError::EmptyImage {
                path: path.clone(),
                width,
                height,
            }
        })?;

        debug!("decoded {:?}: {}x{}", path, width, height);
        self.pixels = Some(pixels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_alternates_cells() {
        let t = Texture::checker(4, 2, [255; 4], [0, 0, 0, 255]);
        let p = t.pixels().unwrap();
        assert_eq!(&p.pixels()[0..4], &[255; 4]);
        // x = 2 starts the second cell on the first row.
        assert_eq!(&p.pixels()[8..12], &[0, 0, 0, 255]);
    }

    #[test]
    fn missing_file_reports_decode_error() {
        let mut t = Texture::from_path("/definitely/not/here.png");
        assert!(matches!(t.load(), Err(SceneError::ImageDecode { .. })));
        assert!(!t.is_loaded());
    }

    #[test]
    fn generated_textures_need_no_load() {
        let mut t = Texture::solid(1, 1, [1, 2, 3, 4]);
        assert!(t.is_loaded());
        t.load().unwrap();
        assert_eq!(t.pixels().unwrap().pixels(), &[1, 2, 3, 4]);
    }
}
