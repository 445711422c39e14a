//! Per-run overlay settings.
//!
//! Settings are immutable snapshots: the pipeline validates them once when a run starts and never
//! mutates them afterwards.

use serde::{Deserialize, Serialize};

use crate::assets::color::ColorDef;
use crate::foundation::error::{ReelmarkError, ReelmarkResult};

/// Logo watermark placement and blending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkSettings {
    /// Logo width as a percentage of the target width, `5..=80`.
    pub size: f64,
    /// Logo opacity, `0.1..=1.0`.
    pub opacity: f32,
    /// Gap between the logo and the right edge in pixels, `0..=200`.
    pub margin_right: f64,
    /// Gap between the logo and the bottom edge in pixels, `0..=400`.
    pub margin_bottom: f64,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            size: 15.0,
            opacity: 0.8,
            margin_right: 40.0,
            margin_bottom: 120.0,
        }
    }
}

impl WatermarkSettings {
    pub fn validate(&self) -> ReelmarkResult<()> {
        check_range("watermark.size", self.size, 5.0, 80.0)?;
        check_range("watermark.opacity", f64::from(self.opacity), 0.1, 1.0)?;
        check_range("watermark.margin_right", self.margin_right, 0.0, 200.0)?;
        check_range("watermark.margin_bottom", self.margin_bottom, 0.0, 400.0)?;
        Ok(())
    }
}

/// Multi-line caption drawn on top of the video.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextOverlaySettings {
    pub enabled: bool,
    /// Literal text; `\n` starts a new line.
    pub content: String,
    /// Font size as a percentage of the target height, `1..=10`.
    pub font_size: f64,
    pub color: ColorDef,
    /// Vertical center of the text block as a percentage of the target height, `0..=100`.
    pub y_position: f64,
    /// Text opacity, `0.1..=1.0`.
    pub opacity: f32,
}

impl Default for TextOverlaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            content: String::new(),
            font_size: 4.0,
            color: ColorDef::WHITE,
            y_position: 80.0,
            opacity: 1.0,
        }
    }
}

impl TextOverlaySettings {
    pub fn validate(&self) -> ReelmarkResult<()> {
        check_range("text.font_size", self.font_size, 1.0, 10.0)?;
        check_range("text.y_position", self.y_position, 0.0, 100.0)?;
        check_range("text.opacity", f64::from(self.opacity), 0.1, 1.0)?;
        Ok(())
    }

    /// Whether anything will actually be drawn for this overlay.
    pub fn is_visible(&self) -> bool {
        self.enabled && !self.content.trim().is_empty()
    }

    /// Content split into drawable lines (`\n` and `\r\n` both break).
    pub fn lines(&self) -> Vec<&str> {
        self.content
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect()
    }
}

/// Settings file layout used by the CLI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    pub watermark: WatermarkSettings,
    pub text: TextOverlaySettings,
}

impl RunSettings {
    pub fn validate(&self) -> ReelmarkResult<()> {
        self.watermark.validate()?;
        self.text.validate()
    }
}

fn check_range(name: &str, v: f64, min: f64, max: f64) -> ReelmarkResult<()> {
    if !v.is_finite() || v < min || v > max {
        return Err(ReelmarkError::validation(format!(
            "{name} must be within [{min}, {max}], got {v}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/settings.rs"]
mod tests;
