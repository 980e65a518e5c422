//! Decode arbitrary input images into the canonical RGB raster.
//!
//! The raster gets a fixed, barely visible unsharp mask followed by a ~1% contrast lift.
//! Both steps are deterministic and never change the pixel dimensions.

use anyhow::{Context, Result, ensure};
use image::{Rgb, RgbImage};

use crate::config::EncodingConfig;

/// Decoder plus the fixed sharpen/contrast pass.
#[derive(Debug, Clone)]
pub struct Normalizer {
    sharpen_sigma: f32,
    sharpen_percent: f32,
    sharpen_threshold: u8,
    contrast_factor: f32,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&EncodingConfig::default())
    }
}

impl Normalizer {
    pub fn from_config(config: &EncodingConfig) -> Self {
        Self {
            sharpen_sigma: config.sharpen_sigma,
            sharpen_percent: config.sharpen_percent,
            sharpen_threshold: config.sharpen_threshold,
            contrast_factor: config.contrast_factor,
        }
    }

    /// Decode `bytes` (any format the `image` crate was built with) and apply the pass.
    pub fn normalize(&self, bytes: &[u8]) -> Result<RgbImage> {
        let decoded = image::load_from_memory(bytes).context("Failed to decode image")?;
        ensure!(
            decoded.width() > 0 && decoded.height() > 0,
            "Image has zero dimensions"
        );
        let raster = decoded.to_rgb8();
        log::debug!("  Decoded {}x{}", raster.width(), raster.height());
        Ok(self.apply(&raster))
    }

    /// Sharpen then lift contrast. Output has the same dimensions as the input.
    pub fn apply(&self, raster: &RgbImage) -> RgbImage {
        let sharpened = unsharp_mask(
            raster,
            self.sharpen_sigma,
            self.sharpen_percent,
            self.sharpen_threshold,
        );
        adjust_contrast(&sharpened, self.contrast_factor)
    }
}

/// Weak unsharp mask: `orig + (orig - blur) * percent / 100`, skipped per channel where the
/// difference is below `threshold`.
pub fn unsharp_mask(raster: &RgbImage, sigma: f32, percent: f32, threshold: u8) -> RgbImage {
    if sigma <= 0.0 || percent == 0.0 || raster.width() == 0 || raster.height() == 0 {
        return raster.clone();
    }
    let blurred = image::imageops::blur(raster, sigma);
    let amount = percent / 100.0;
    let threshold = threshold as i32;

    let mut out = raster.clone();
    for (px, blur_px) in out.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let orig = px.0[c] as i32;
            let diff = orig - blur_px.0[c] as i32;
            if diff.abs() >= threshold {
                let v = orig as f32 + diff as f32 * amount;
                px.0[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Scale every channel away from the image's mean gray level by `factor`.
pub fn adjust_contrast(raster: &RgbImage, factor: f32) -> RgbImage {
    if (factor - 1.0).abs() < f32::EPSILON {
        return raster.clone();
    }
    let mean = crate::photometric::luma_mean(raster).round() as f32;
    let mut out = raster.clone();
    for px in out.pixels_mut() {
        let Rgb(ch) = *px;
        *px = Rgb(ch.map(|v| (mean + (v as f32 - mean) * factor).round().clamp(0.0, 255.0) as u8));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::encode_jpeg;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_bytes(raster: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        raster.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 90]))
    }

    // ── decode ───────────────────────────────────────────────────────

    #[test]
    fn keeps_dimensions() {
        let out = Normalizer::default().normalize(&png_bytes(&gradient(37, 21))).unwrap();
        assert_eq!(out.dimensions(), (37, 21));
    }

    #[test]
    fn rejects_undecodable_bytes() {
        assert!(Normalizer::default().normalize(b"\x00\x01\x02 not an image").is_err());
        assert!(Normalizer::default().normalize(&[]).is_err());
    }

    #[test]
    fn renormalizing_keeps_dimensions() {
        let n = Normalizer::default();
        let first = n.normalize(&png_bytes(&gradient(64, 48))).unwrap();
        let jpeg = encode_jpeg(&first, 95).unwrap();
        let second = n.normalize(&jpeg).unwrap();
        assert_eq!(first.dimensions(), second.dimensions());
    }

    // ── adjustments ──────────────────────────────────────────────────

    #[test]
    fn solid_gray_is_a_fixed_point() {
        let gray = RgbImage::from_pixel(20, 20, Rgb([128, 128, 128]));
        assert_eq!(Normalizer::default().apply(&gray), gray);
    }

    #[test]
    fn adjustments_are_deterministic() {
        let n = Normalizer::default();
        let src = gradient(40, 30);
        assert_eq!(n.apply(&src), n.apply(&src));
    }

    #[test]
    fn changes_are_barely_perceptible() {
        let src = gradient(50, 50);
        let out = Normalizer::default().apply(&src);
        let max_delta = src
            .pixels()
            .zip(out.pixels())
            .flat_map(|(a, b)| (0..3).map(move |c| (a.0[c] as i32 - b.0[c] as i32).abs()))
            .max()
            .unwrap_or(0);
        assert!(max_delta <= 4, "max channel delta {max_delta}");
    }

    #[test]
    fn contrast_spreads_values_from_mean() {
        let img = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([28; 3]) } else { Rgb([228; 3]) });
        let out = adjust_contrast(&img, 1.1);
        assert!(out.get_pixel(0, 0).0[0] < 28);
        assert!(out.get_pixel(1, 0).0[0] > 228);
    }

    #[test]
    fn unsharp_respects_threshold() {
        let src = gradient(30, 30);
        // A threshold above any possible difference leaves the image untouched
        assert_eq!(unsharp_mask(&src, 1.0, 50.0, 255), src);
        assert_eq!(unsharp_mask(&src, 0.0, 50.0, 0), src);
    }
}
