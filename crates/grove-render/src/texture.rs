// SPDX-License-Identifier: CEPL-1.0

/// Material slot a texture is bound to. Only albedo is sampled today.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    Albedo,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 1] = [TextureSlot::Albedo];
}

/// Decoded RGBA8 pixels, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelSource {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelSource {
    /// Returns `None` when the buffer size doesn't match `width * height * 4`
    /// or either dimension is zero.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        (expected != 0 && pixels.len() == expected).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Fills a `width × height` image with one colour. Zero dimensions become 1.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let pixels = rgba.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffers() {
        assert!(PixelSource::new(2, 2, vec![0; 15]).is_none());
        assert!(PixelSource::new(0, 2, vec![]).is_none());
        assert!(PixelSource::new(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn solid_fills_every_pixel() {
        let p = PixelSource::solid(3, 2, [1, 2, 3, 4]);
        assert_eq!(p.byte_len(), 24);
        assert!(p.pixels().chunks(4).all(|px| px == [1, 2, 3, 4]));
        assert_eq!(PixelSource::solid(0, 0, [0; 4]).byte_len(), 4);
    }
}
