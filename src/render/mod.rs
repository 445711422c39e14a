//! Off-screen rendering of composited frames.

pub(crate) mod blur;
/// Per-frame compositor owning the fixed render target.
pub mod compose;
pub(crate) mod composite;
pub(crate) mod text;

use std::sync::Arc;

/// A rendered frame as RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// RGBA8 value of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// One decoded source frame in premultiplied RGBA8.
///
/// Video decoders emit opaque pixels, for which straight and premultiplied forms coincide.
#[derive(Clone, Debug)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl SourceFrame {
    /// A frame filled with a single opaque color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let px = [rgb[0], rgb[1], rgb[2], 255];
        Self {
            width,
            height,
            data: Arc::new(px.repeat(width as usize * height as usize)),
        }
    }
}
