//! Source-over blending of premultiplied RGBA8 layers onto the render target.

use crate::foundation::core::Rgba8Premul;
use crate::foundation::math::{mul_div255_u8, opacity_to_u8};

pub(crate) type PremulRgba8 = [u8; 4];

/// Blend `src` over `dst` with an extra `opacity` multiplier.
pub(crate) fn over(dst: PremulRgba8, src: PremulRgba8, opacity: u16) -> PremulRgba8 {
    if opacity == 0 || src[3] == 0 {
        return dst;
    }

    let sa = mul_div255_u8(u16::from(src[3]), opacity);
    if sa == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), opacity);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// A rectangular premultiplied RGBA8 layer positioned on the target in whole pixels.
#[derive(Clone, Debug)]
pub(crate) struct PlacedLayer {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<u8>,
}

/// A single-channel coverage mask painted with one color.
#[derive(Clone, Debug)]
pub(crate) struct PlacedMask {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) coverage: Vec<u8>,
    pub(crate) color: Rgba8Premul,
}

/// Row/column spans of a `w x h` layer at `(x, y)` that fall inside a `dst_w x dst_h` target.
struct Overlap {
    src_x: usize,
    src_y: usize,
    dst_x: usize,
    dst_y: usize,
    w: usize,
    h: usize,
}

fn overlap(dst_w: u32, dst_h: u32, x: i32, y: i32, w: u32, h: u32) -> Option<Overlap> {
    let x0 = i64::from(x).max(0);
    let y0 = i64::from(y).max(0);
    let x1 = (i64::from(x) + i64::from(w)).min(i64::from(dst_w));
    let y1 = (i64::from(y) + i64::from(h)).min(i64::from(dst_h));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(Overlap {
        src_x: (x0 - i64::from(x)) as usize,
        src_y: (y0 - i64::from(y)) as usize,
        dst_x: x0 as usize,
        dst_y: y0 as usize,
        w: (x1 - x0) as usize,
        h: (y1 - y0) as usize,
    })
}

impl PlacedLayer {
    /// Composite onto a `dst_w x dst_h` premultiplied RGBA8 buffer, clipping to its bounds.
    pub(crate) fn draw_over(&self, dst: &mut [u8], dst_w: u32, dst_h: u32, opacity: f32) {
        let op = opacity_to_u8(opacity);
        let Some(o) = overlap(dst_w, dst_h, self.x, self.y, self.width, self.height) else {
            return;
        };
        let (dst_stride, src_stride) = (dst_w as usize * 4, self.width as usize * 4);
        for row in 0..o.h {
            let s = (o.src_y + row) * src_stride + o.src_x * 4;
            let d = (o.dst_y + row) * dst_stride + o.dst_x * 4;
            let src_row = &self.data[s..s + o.w * 4];
            let dst_row = &mut dst[d..d + o.w * 4];
            for (dp, sp) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let out = over([dp[0], dp[1], dp[2], dp[3]], [sp[0], sp[1], sp[2], sp[3]], op);
                dp.copy_from_slice(&out);
            }
        }
    }
}

impl PlacedMask {
    /// Composite `color * coverage` onto the target, clipping to its bounds.
    pub(crate) fn draw_over(&self, dst: &mut [u8], dst_w: u32, dst_h: u32, opacity: f32) {
        let op = opacity_to_u8(opacity);
        let Some(o) = overlap(dst_w, dst_h, self.x, self.y, self.width, self.height) else {
            return;
        };
        let color = self.color.to_array();
        let dst_stride = dst_w as usize * 4;
        for row in 0..o.h {
            let s = (o.src_y + row) * self.width as usize + o.src_x;
            let d = (o.dst_y + row) * dst_stride + o.dst_x * 4;
            let src_row = &self.coverage[s..s + o.w];
            let dst_row = &mut dst[d..d + o.w * 4];
            for (dp, &cov) in dst_row.chunks_exact_mut(4).zip(src_row) {
                if cov == 0 {
                    continue;
                }
                let c = u16::from(cov);
                let src = [
                    mul_div255_u8(u16::from(color[0]), c),
                    mul_div255_u8(u16::from(color[1]), c),
                    mul_div255_u8(u16::from(color[2]), c),
                    mul_div255_u8(u16::from(color[3]), c),
                ];
                let out = over([dp[0], dp[1], dp[2], dp[3]], src, op);
                dp.copy_from_slice(&out);
            }
        }
    }
}

/// Flatten premultiplied RGBA8 over an opaque background into opaque RGBA8.
pub(crate) fn flatten_premul_over_bg(dst: &mut [u8], src_premul: &[u8], bg: [u8; 3]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            d[c] = s[c].saturating_add(mul_div255_u8(u16::from(bg[c]), inv));
        }
        d[3] = 255;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
