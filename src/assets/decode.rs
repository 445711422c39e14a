use std::sync::Arc;

use crate::foundation::error::{ReelmarkError, ReelmarkResult};

/// A fully decoded logo in premultiplied RGBA8 form.
///
/// Holding a `LogoImage` means decoding completed; there is no partially loaded state.
#[derive(Clone, Debug)]
pub struct LogoImage {
    /// Natural width in pixels.
    pub width: u32,
    /// Natural height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl LogoImage {
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Decode logo bytes (PNG, JPEG, GIF, WebP, ...) and convert to premultiplied RGBA8.
#[tracing::instrument(skip_all, fields(len = bytes.len()))]
pub fn load_logo(bytes: &[u8]) -> ReelmarkResult<LogoImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| ReelmarkError::image_load(format!("decode logo from memory: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ReelmarkError::image_load("logo has a zero dimension"));
    }

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);
    tracing::debug!(width, height, "logo decoded");

    Ok(LogoImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// Premultiply straight-alpha RGBA8 pixels in place.
pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
