//! Placement math for the composited frame.
//!
//! Everything here is a pure function of the target canvas, the source/logo dimensions and the
//! overlay settings, so a frame can be recomposed identically from the same inputs.

use crate::foundation::core::{Canvas, Rect};
use crate::settings::{TextOverlaySettings, WatermarkSettings};

/// Line height as a multiple of the font pixel size.
pub const LINE_HEIGHT_FACTOR: f64 = 1.2;

/// Uniform "contain" fit of a source into the target canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainFit {
    pub scale: f64,
    /// Scaled source rectangle, centered on both axes.
    pub rect: Rect,
}

impl ContainFit {
    /// Fit a `source_w x source_h` frame into `canvas` without cropping.
    ///
    /// Degenerate sources (zero or non-finite size) yield an empty rectangle at the canvas
    /// center, leaving the whole frame as background.
    pub fn compute(canvas: Canvas, source_w: u32, source_h: u32) -> Self {
        let (cw, ch) = (f64::from(canvas.width), f64::from(canvas.height));
        if source_w == 0 || source_h == 0 {
            let c = Rect::new(cw / 2.0, ch / 2.0, cw / 2.0, ch / 2.0);
            return Self { scale: 0.0, rect: c };
        }

        let (sw, sh) = (f64::from(source_w), f64::from(source_h));
        let scale = (cw / sw).min(ch / sh);
        let (w, h) = (sw * scale, sh * scale);
        let x = (cw - w) / 2.0;
        let y = (ch - h) / 2.0;
        Self {
            scale,
            rect: Rect::new(x, y, x + w, y + h),
        }
    }
}

/// Logo rectangle anchored to the bottom-right corner with explicit pixel margins.
///
/// Returns `None` for logos with a zero dimension.
pub fn logo_rect(
    canvas: Canvas,
    logo_w: u32,
    logo_h: u32,
    settings: &WatermarkSettings,
) -> Option<Rect> {
    if logo_w == 0 || logo_h == 0 {
        return None;
    }
    let cw = f64::from(canvas.width);
    let ch = f64::from(canvas.height);
    let aspect = f64::from(logo_w) / f64::from(logo_h);

    let w = cw * (settings.size / 100.0);
    let h = w / aspect;
    let x = cw - w - settings.margin_right;
    let y = ch - h - settings.margin_bottom;
    Some(Rect::new(x, y, x + w, y + h))
}

/// Vertical layout of a multi-line text block.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlockLayout {
    pub font_px: f64,
    pub line_height: f64,
    /// Vertical center of the whole block.
    pub center_y: f64,
    /// Horizontal center every line is aligned on.
    pub center_x: f64,
    /// Baseline of each line, top to bottom.
    pub baselines: Vec<f64>,
}

impl TextBlockLayout {
    /// Lay out `line_count` lines centered on `y_position`% of the canvas height.
    pub fn compute(canvas: Canvas, settings: &TextOverlaySettings, line_count: usize) -> Self {
        let ch = f64::from(canvas.height);
        let font_px = ch * (settings.font_size / 100.0);
        let line_height = font_px * LINE_HEIGHT_FACTOR;
        let center_y = ch * (settings.y_position / 100.0);

        let first = center_y - (line_count.saturating_sub(1) as f64) * line_height / 2.0;
        let baselines = (0..line_count)
            .map(|i| first + i as f64 * line_height)
            .collect();

        Self {
            font_px,
            line_height,
            center_y,
            center_x: f64::from(canvas.width) / 2.0,
            baselines,
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/geometry.rs"]
mod tests;
