use std::path::Path;
use std::sync::Arc;

use crate::assets::decode::LogoImage;
use crate::assets::font::{load_font_file, resolve_bold_sans};
use crate::foundation::core::{Canvas, Rect, Rgba8Premul};
use crate::foundation::error::{ReelmarkError, ReelmarkResult};
use crate::geometry::{ContainFit, logo_rect};
use crate::render::text::TextOverlay;
use crate::render::{FrameRGBA, SourceFrame};
use crate::settings::{TextOverlaySettings, WatermarkSettings};

#[derive(Clone)]
struct LogoPaint {
    paint: vello_cpu::Image,
    natural_w: f64,
    natural_h: f64,
    rect: Rect,
    opacity: f32,
}

/// Renders composited frames into the fixed render target.
///
/// Overlay assets are prepared once in [`FrameCompositor::new`]; [`FrameCompositor::compose`]
/// depends only on the source frame it is given, never on previously drawn frames.
pub struct FrameCompositor {
    canvas: Canvas,
    ctx: vello_cpu::RenderContext,
    target: vello_cpu::Pixmap,
    logo: Option<LogoPaint>,
    text: Option<TextOverlay>,
    frame: FrameRGBA,
}

impl std::fmt::Debug for FrameCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompositor")
            .field("canvas", &self.canvas)
            .field("logo", &self.logo.as_ref().map(|l| l.rect))
            .field("text", &self.text.is_some())
            .finish()
    }
}

impl FrameCompositor {
    /// Prepare overlays for one run.
    ///
    /// `font_path` overrides the system bold sans-serif face; it is only consulted when the
    /// caption is visible.
    pub fn new(
        canvas: Canvas,
        logo: Option<&LogoImage>,
        watermark: &WatermarkSettings,
        text: &TextOverlaySettings,
        font_path: Option<&Path>,
    ) -> ReelmarkResult<Self> {
        let (w16, h16) = canvas_dims_u16(canvas)?;

        let logo = match logo {
            Some(img) => logo_rect(canvas, img.width, img.height, watermark)
                .map(|rect| -> ReelmarkResult<LogoPaint> {
                    let pixmap =
                        image_premul_bytes_to_pixmap(&img.rgba8_premul, img.width, img.height)?;
                    Ok(LogoPaint {
                        paint: vello_cpu::Image {
                            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
                            sampler: vello_cpu::peniko::ImageSampler::default(),
                        },
                        natural_w: f64::from(img.width),
                        natural_h: f64::from(img.height),
                        rect,
                        opacity: watermark.opacity,
                    })
                })
                .transpose()?,
            None => None,
        };

        let text = if text.is_visible() {
            let font = match font_path {
                Some(path) => load_font_file(path)?,
                None => resolve_bold_sans()?,
            };
            TextOverlay::prepare(canvas, text, &font)?
        } else {
            None
        };

        Ok(Self {
            canvas,
            ctx: vello_cpu::RenderContext::new(w16, h16),
            target: vello_cpu::Pixmap::new(w16, h16),
            logo,
            text,
            frame: FrameRGBA {
                width: canvas.width,
                height: canvas.height,
                data: vec![0u8; canvas.rgba8_len()],
                premultiplied: true,
            },
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Draw one composited frame: black background, contained source, logo, caption.
    pub fn compose(&mut self, source: &SourceFrame) -> ReelmarkResult<&FrameRGBA> {
        // Reused across frames; reset drops the previous frame's commands and paints.
        let ctx = &mut self.ctx;
        ctx.reset();
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

        let black = Rgba8Premul::BLACK;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            black.r, black.g, black.b, black.a,
        ));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(self.canvas.width),
            f64::from(self.canvas.height),
        ));

        let fit = ContainFit::compute(self.canvas, source.width, source.height);
        if fit.scale > 0.0 {
            let pixmap = image_premul_bytes_to_pixmap(&source.data, source.width, source.height)?;
            ctx.set_transform(
                vello_cpu::kurbo::Affine::translate((fit.rect.x0, fit.rect.y0))
                    * vello_cpu::kurbo::Affine::scale(fit.scale),
            );
            ctx.set_paint(vello_cpu::Image {
                image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
                sampler: vello_cpu::peniko::ImageSampler::default(),
            });
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(source.width),
                f64::from(source.height),
            ));
        }

        if let Some(logo) = &self.logo {
            ctx.set_transform(
                vello_cpu::kurbo::Affine::translate((logo.rect.x0, logo.rect.y0))
                    * vello_cpu::kurbo::Affine::scale_non_uniform(
                        logo.rect.width() / logo.natural_w,
                        logo.rect.height() / logo.natural_h,
                    ),
            );
            ctx.set_paint(logo.paint.clone());
            if logo.opacity < 1.0 {
                ctx.push_opacity_layer(logo.opacity);
            }
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                logo.natural_w,
                logo.natural_h,
            ));
            if logo.opacity < 1.0 {
                ctx.pop_layer();
            }
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut self.target);
        self.frame
            .data
            .copy_from_slice(self.target.data_as_u8_slice());

        if let Some(text) = &self.text {
            text.draw_over(&mut self.frame.data, self.canvas);
        }
        Ok(&self.frame)
    }
}

fn canvas_dims_u16(canvas: Canvas) -> ReelmarkResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| ReelmarkError::validation("canvas width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| ReelmarkError::validation("canvas height exceeds u16"))?;
    if w == 0 || h == 0 {
        return Err(ReelmarkError::validation("canvas width/height must be non-zero"));
    }
    Ok((w, h))
}

fn image_premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> ReelmarkResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| ReelmarkError::validation("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ReelmarkError::validation("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(ReelmarkError::validation("image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let pixels = rgba8_premul
        .chunks_exact(4)
        .map(|px| {
            may_have_opacities |= px[3] != 255;
            vello_cpu::peniko::color::PremulRgba8 {
                r: px[0],
                g: px[1],
                b: px[2],
                a: px[3],
            }
        })
        .collect::<Vec<_>>();

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/compose.rs"]
mod tests;
