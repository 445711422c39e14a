//! Text overlay rasterization.
//!
//! The caption is static for a whole run, so its glyph layer and blurred shadow mask are
//! rasterized once when the compositor is built and blended onto every frame afterwards.

use crate::assets::font::ResolvedFont;
use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::{ReelmarkError, ReelmarkResult};
use crate::geometry::TextBlockLayout;
use crate::render::blur::GaussianKernel;
use crate::render::composite::{PlacedLayer, PlacedMask};
use crate::settings::TextOverlaySettings;

/// Canvas-style shadow blur of the caption; the gaussian sigma is half of it.
pub const SHADOW_BLUR_PX: f32 = 4.0;
/// Shadow offset on both axes.
pub const SHADOW_OFFSET_PX: i32 = 2;
/// Shadow color (black at 50%).
pub const SHADOW_ALPHA: u8 = 128;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// Parley contexts bound to one registered font face.
pub(crate) struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    family_name: String,
    font: vello_cpu::peniko::FontData,
}

impl TextLayoutEngine {
    pub(crate) fn new(font: &ResolvedFont) -> ReelmarkResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font.bytes.as_ref().clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            ReelmarkError::validation("no font families registered from font bytes")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ReelmarkError::validation("registered font family has no name"))?
            .to_string();

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
            font: vello_cpu::peniko::FontData::new(
                vello_cpu::peniko::Blob::from(font.bytes.as_ref().clone()),
                font.index,
            ),
        })
    }

    /// Shape a single line of bold text at `size_px`.
    pub(crate) fn layout_line(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrushRgba8,
    ) -> ReelmarkResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ReelmarkError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::BOLD,
        ));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

/// One shaped caption line and where its layout origin lands on the canvas.
struct PlacedLine {
    layout: parley::Layout<TextBrushRgba8>,
    origin_x: f64,
    origin_y: f64,
    top: f64,
    bottom: f64,
    width: f64,
}

/// Pre-rasterized caption: colored glyphs plus a blurred shadow mask.
#[derive(Clone, Debug)]
pub(crate) struct TextOverlay {
    pub(crate) glyphs: PlacedLayer,
    pub(crate) shadow: PlacedMask,
    pub(crate) opacity: f32,
}

impl TextOverlay {
    /// Shape and rasterize the caption; `None` when the overlay draws nothing.
    #[tracing::instrument(skip_all, fields(lines = settings.lines().len()))]
    pub(crate) fn prepare(
        canvas: Canvas,
        settings: &TextOverlaySettings,
        font: &ResolvedFont,
    ) -> ReelmarkResult<Option<Self>> {
        if !settings.is_visible() {
            return Ok(None);
        }

        let lines = settings.lines();
        let block = TextBlockLayout::compute(canvas, settings, lines.len());
        let mut engine = TextLayoutEngine::new(font)?;
        let c = settings.color;
        let brush = TextBrushRgba8 {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        };

        let mut placed = Vec::with_capacity(lines.len());
        for (line, &baseline) in lines.iter().zip(&block.baselines) {
            if line.trim().is_empty() {
                continue;
            }
            let layout = engine.layout_line(line, block.font_px as f32, brush)?;
            let Some((line_baseline, ascent, descent)) = layout.lines().next().map(|l| {
                let m = l.metrics();
                (m.baseline, m.ascent, m.descent)
            }) else {
                continue;
            };
            let width = f64::from(layout.width());
            let origin_x = block.center_x - width / 2.0;
            let origin_y = baseline - f64::from(line_baseline);
            placed.push(PlacedLine {
                top: baseline - f64::from(ascent),
                bottom: baseline + f64::from(descent),
                layout,
                origin_x,
                origin_y,
                width,
            });
        }
        if placed.is_empty() {
            return Ok(None);
        }

        let kernel = GaussianKernel::new((SHADOW_BLUR_PX * 1.5).ceil() as u32, SHADOW_BLUR_PX / 2.0)?;
        let pad = f64::from(kernel.radius()) + 2.0;

        // Layer extents are the text bounds clipped to the canvas grown by the blur padding.
        let canvas_w = f64::from(canvas.width);
        let canvas_h = f64::from(canvas.height);
        let left = (placed.iter().map(|l| l.origin_x).fold(f64::INFINITY, f64::min) - pad)
            .max(-pad);
        let right = (placed
            .iter()
            .map(|l| l.origin_x + l.width)
            .fold(f64::NEG_INFINITY, f64::max)
            + pad)
            .min(canvas_w + pad);
        let top = (placed.iter().map(|l| l.top).fold(f64::INFINITY, f64::min) - pad).max(-pad);
        let bottom = (placed.iter().map(|l| l.bottom).fold(f64::NEG_INFINITY, f64::max) + pad)
            .min(canvas_h + pad);
        if right <= left || bottom <= top {
            return Ok(None);
        }

        let x = left.floor() as i32;
        let y = top.floor() as i32;
        let width = ((right.ceil() as i32) - x).max(1) as u32;
        let height = ((bottom.ceil() as i32) - y).max(1) as u32;

        let rgba = rasterize_lines(&placed, &engine.font, x, y, width, height)?;
        let coverage: Vec<u8> = rgba.chunks_exact(4).map(|px| px[3]).collect();
        let blurred = kernel.blur_mask(&coverage, width, height);

        Ok(Some(Self {
            glyphs: PlacedLayer {
                x,
                y,
                width,
                height,
                data: rgba,
            },
            shadow: PlacedMask {
                x: x + SHADOW_OFFSET_PX,
                y: y + SHADOW_OFFSET_PX,
                width,
                height,
                coverage: blurred,
                color: Rgba8Premul::from_straight_rgba(0, 0, 0, SHADOW_ALPHA),
            },
            opacity: settings.opacity,
        }))
    }

    /// Blend shadow then glyphs onto a premultiplied RGBA8 frame.
    pub(crate) fn draw_over(&self, dst: &mut [u8], canvas: Canvas) {
        self.shadow
            .draw_over(dst, canvas.width, canvas.height, self.opacity);
        self.glyphs
            .draw_over(dst, canvas.width, canvas.height, self.opacity);
    }
}

fn rasterize_lines(
    lines: &[PlacedLine],
    font: &vello_cpu::peniko::FontData,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> ReelmarkResult<Vec<u8>> {
    let w: u16 = width
        .try_into()
        .map_err(|_| ReelmarkError::validation("text layer width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ReelmarkError::validation("text layer height exceeds u16"))?;

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    for line in lines {
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((
            line.origin_x - f64::from(x),
            line.origin_y - f64::from(y),
        )));
        for layout_line in line.layout.lines() {
            for item in layout_line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
    ctx.flush();

    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap.data_as_u8_slice().to_vec())
}

#[cfg(test)]
#[path = "../../tests/unit/render/text.rs"]
mod tests;
