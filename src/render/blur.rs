//! Separable gaussian blur over single-channel coverage masks (used for the text shadow).

use crate::foundation::error::{ReelmarkError, ReelmarkResult};

/// Fixed-point (Q16) gaussian kernel of `2 * radius + 1` taps summing to exactly `1 << 16`.
#[derive(Clone, Debug)]
pub(crate) struct GaussianKernel {
    weights: Vec<u32>,
}

impl GaussianKernel {
    pub(crate) fn new(radius: u32, sigma: f32) -> ReelmarkResult<Self> {
        if radius == 0 {
            return Ok(Self {
                weights: vec![1 << 16],
            });
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(ReelmarkError::validation("blur sigma must be > 0"));
        }

        let r = radius as i32;
        let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
        let raw: Vec<f64> = (-r..=r)
            .map(|i| {
                let x = f64::from(i);
                (-x * x / denom).exp()
            })
            .collect();
        let sum: f64 = raw.iter().sum();

        let mut weights: Vec<u32> = raw
            .iter()
            .map(|w| ((w / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
            .collect();
        // Push the rounding error into the center tap so the kernel preserves energy.
        let total: i64 = weights.iter().map(|&w| i64::from(w)).sum();
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + 65536 - total).clamp(0, 65536) as u32;

        Ok(Self { weights })
    }

    pub(crate) fn radius(&self) -> u32 {
        (self.weights.len() / 2) as u32
    }

    /// Blur a `width x height` mask, clamping samples at the edges.
    pub(crate) fn blur_mask(&self, mask: &[u8], width: u32, height: u32) -> Vec<u8> {
        let (w, h) = (width as usize, height as usize);
        debug_assert_eq!(mask.len(), w * h);
        if self.weights.len() == 1 || w == 0 || h == 0 {
            return mask.to_vec();
        }

        let mut tmp = vec![0u8; mask.len()];
        let mut out = vec![0u8; mask.len()];
        let mut column = vec![0u8; h];
        for y in 0..h {
            let row = &mask[y * w..(y + 1) * w];
            self.convolve_line(|i| row[i], &mut tmp[y * w..(y + 1) * w]);
        }
        for x in 0..w {
            self.convolve_line(|i| tmp[i * w + x], &mut column);
            for (y, &v) in column.iter().enumerate() {
                out[y * w + x] = v;
            }
        }
        out
    }

    fn convolve_line(&self, sample: impl Fn(usize) -> u8, dst: &mut [u8]) {
        let radius = (self.weights.len() / 2) as i64;
        let last = dst.len() as i64 - 1;
        for i in 0..dst.len() {
            let mut acc = 0u64;
            for (k, &kw) in self.weights.iter().enumerate() {
                let at = (i as i64 + k as i64 - radius).clamp(0, last) as usize;
                acc += u64::from(kw) * u64::from(sample(at));
            }
            dst[i] = ((acc + 32768) >> 16).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/blur.rs"]
mod tests;
