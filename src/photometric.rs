//! Exposure parameters derived from actual pixel brightness.
//!
//! Darker scenes get a higher ISO and a slower shutter, brighter scenes the opposite, so the
//! synthesized exposure loosely tracks what a phone would have metered for the same frame.

use image::RgbImage;
use rand::Rng;
use std::ops::RangeInclusive;

/// Fixed-point denominator for APEX rationals.
pub const APEX_DENOMINATOR: i32 = 1000;

/// ISO and exposure-denominator ranges for one brightness band.
#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessBand {
    /// Exclusive upper bound on mean luma; `None` for the brightest band.
    pub luma_below: Option<f64>,
    pub iso: RangeInclusive<u32>,
    pub exposure_denominator: RangeInclusive<u32>,
}

/// Four bands, darkest first.
pub fn bands() -> [BrightnessBand; 4] {
    [
        BrightnessBand { luma_below: Some(50.0), iso: 640..=2500, exposure_denominator: 15..=60 },
        BrightnessBand { luma_below: Some(100.0), iso: 200..=640, exposure_denominator: 60..=250 },
        BrightnessBand { luma_below: Some(150.0), iso: 64..=250, exposure_denominator: 120..=1000 },
        BrightnessBand { luma_below: None, iso: 32..=100, exposure_denominator: 500..=4000 },
    ]
}

/// Pick the band a given mean luma falls into.
pub fn band_for(luma_mean: f64) -> BrightnessBand {
    let [b0, b1, b2, b3] = bands();
    for band in [b0, b1, b2] {
        if band.luma_below.is_some_and(|limit| luma_mean < limit) {
            return band;
        }
    }
    b3
}

/// A signed rational with a fixed denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedRational {
    pub numerator: i32,
    pub denominator: i32,
}

impl SignedRational {
    /// Fixed-point at the APEX denominator. A nonzero value never rounds to zero; it keeps
    /// its sign at the smallest step.
    pub fn from_f64(value: f64) -> Self {
        let mut numerator = (value * APEX_DENOMINATOR as f64).round() as i32;
        if numerator == 0 && value != 0.0 {
            numerator = if value < 0.0 { -1 } else { 1 };
        }
        Self {
            numerator,
            denominator: APEX_DENOMINATOR,
        }
    }

    pub fn zero() -> Self {
        Self { numerator: 0, denominator: APEX_DENOMINATOR }
    }

    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

/// Per-image exposure values.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotometricParameters {
    pub luma_mean: f64,
    pub iso: u32,
    pub exposure_denominator: u32,
    pub aperture: f64,
    pub brightness_value: SignedRational,
    pub shutter_speed_value: SignedRational,
}

impl PhotometricParameters {
    /// Exposure time in seconds, `1 / exposure_denominator`.
    pub fn exposure_time(&self) -> f64 {
        exposure_time(self.exposure_denominator)
    }
}

fn exposure_time(denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        1.0 / denominator as f64
    }
}

/// Arithmetic mean of the raster's luminance, in `[0, 255]`.
pub fn luma_mean(raster: &RgbImage) -> f64 {
    let gray = image::imageops::grayscale(raster);
    let count = gray.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.as_raw().iter().map(|&v| v as u64).sum();
    sum as f64 / count as f64
}

/// APEX brightness value, `log2(aperture² / (t · iso))`; zero for non-positive inputs.
pub fn brightness_value(aperture: f64, exposure_time: f64, iso: u32) -> SignedRational {
    if exposure_time <= 0.0 || iso == 0 || aperture <= 0.0 {
        return SignedRational::zero();
    }
    let bv = (aperture * aperture / (exposure_time * iso as f64)).log2();
    if bv.is_finite() {
        SignedRational::from_f64(bv)
    } else {
        SignedRational::zero()
    }
}

/// APEX shutter speed value, `-log2(t)`; zero for non-positive exposure time.
pub fn shutter_speed_value(exposure_time: f64) -> SignedRational {
    if exposure_time <= 0.0 {
        return SignedRational::zero();
    }
    SignedRational::from_f64(-exposure_time.log2())
}

/// Derive ISO, shutter and APEX values for one image.
pub fn derive_parameters<R: Rng + ?Sized>(
    raster: &RgbImage,
    nominal_aperture: f64,
    rng: &mut R,
) -> PhotometricParameters {
    let luma = luma_mean(raster);
    parameters_for_luma(luma, nominal_aperture, rng)
}

/// Same as [`derive_parameters`] for an already-measured mean luma.
pub fn parameters_for_luma<R: Rng + ?Sized>(
    luma_mean: f64,
    nominal_aperture: f64,
    rng: &mut R,
) -> PhotometricParameters {
    let band = band_for(luma_mean);
    let iso = rng.random_range(band.iso.clone());
    let exposure_denominator = rng.random_range(band.exposure_denominator.clone());
    let t = exposure_time(exposure_denominator);

    let params = PhotometricParameters {
        luma_mean,
        iso,
        exposure_denominator,
        aperture: nominal_aperture,
        brightness_value: brightness_value(nominal_aperture, t, iso),
        shutter_speed_value: shutter_speed_value(t),
    };

    log::debug!(
        "  Luma {:.1} -> ISO {}, 1/{} s, BV {:.2}, SV {:.2}",
        params.luma_mean,
        params.iso,
        params.exposure_denominator,
        params.brightness_value.as_f64(),
        params.shutter_speed_value.as_f64(),
    );

    params
}
