use anyhow::{Result, ensure};
use chrono::{Duration, NaiveDateTime, Timelike};
use rand::Rng;

use crate::photometric::{PhotometricParameters, SignedRational};
use crate::session::Session;

/// EXIF `YYYY:MM:DD HH:MM:SS` layout.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d";

/// Upper bound of the file-timestamp offset from the capture anchor.
pub const FILE_TIME_JITTER_MS: i64 = 500;
/// Upper bound of the digitized-timestamp offset from the capture anchor.
pub const DIGITIZED_TIME_JITTER_MS: i64 = 200;

const MAP_DATUM: &str = "WGS-84";
const DEFAULT_RESOLUTION_DPI: u32 = 72;

/// An unsigned EXIF rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// `value` rounded to `denominator` fixed-point precision.
    pub fn from_f64(value: f64, denominator: u32) -> Self {
        Self {
            numerator: (value.max(0.0) * denominator as f64).round() as u32,
            denominator,
        }
    }

    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

/// Degrees, minutes, and seconds×100, all non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dms {
    pub degrees: u32,
    pub minutes: u32,
    pub seconds_x100: u32,
}

impl Dms {
    /// The three rationals stored in `GPSLatitude` / `GPSLongitude`.
    pub fn rationals(&self) -> [Rational; 3] {
        [
            Rational::new(self.degrees, 1),
            Rational::new(self.minutes, 1),
            Rational::new(self.seconds_x100, 100),
        ]
    }

    pub fn to_decimal(&self) -> f64 {
        self.degrees as f64 + self.minutes as f64 / 60.0 + self.seconds_x100 as f64 / 360_000.0
    }
}

/// A GPS axis value plus its hemisphere reference (`N`/`S` or `E`/`W`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsCoordinate {
    pub dms: Dms,
    pub reference: char,
}

impl GpsCoordinate {
    pub fn latitude(decimal: f64) -> Self {
        Self {
            dms: to_dms(decimal),
            reference: if decimal >= 0.0 { 'N' } else { 'S' },
        }
    }

    pub fn longitude(decimal: f64) -> Self {
        Self {
            dms: to_dms(decimal),
            reference: if decimal >= 0.0 { 'E' } else { 'W' },
        }
    }

    /// Signed decimal degrees.
    pub fn to_decimal(&self) -> f64 {
        let v = self.dms.to_decimal();
        if self.reference == 'S' || self.reference == 'W' { -v } else { v }
    }
}

/// Split the magnitude of a decimal coordinate into whole degrees, whole minutes and
/// seconds scaled by 100 (truncated, so the seconds never reach 60).
pub fn to_dms(decimal: f64) -> Dms {
    let abs = decimal.abs();
    let degrees = abs.trunc();
    let minutes_f = (abs - degrees) * 60.0;
    let minutes = minutes_f.trunc();
    let seconds_x100 = ((minutes_f - minutes) * 60.0 * 100.0).trunc();
    Dms {
        degrees: degrees as u32,
        minutes: minutes as u32,
        seconds_x100: (seconds_x100 as u32).min(5999),
    }
}

/// Signed `HH:00` offset string, e.g. `+01:00`, `-08:00`.
pub fn format_utc_offset(hours: i32) -> String {
    let sign = if hours < 0 { '-' } else { '+' };
    format!("{sign}{:02}:00", hours.abs())
}

/// All timestamps for one image, correlated around a single capture anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTimes {
    /// Shutter time, local to the session location. `DateTimeOriginal` uses this as is.
    pub anchor: NaiveDateTime,
    /// `DateTimeDigitized`, anchor + 0..=200 ms.
    pub digitized: NaiveDateTime,
    /// File modification time (`DateTime`), anchor + 0..=500 ms.
    pub file: NaiveDateTime,
    /// Milliseconds shared by all three `SubSecTime*` tags.
    pub sub_sec: u16,
    /// Whole hours east of UTC.
    pub utc_offset_hours: i32,
}

impl CaptureTimes {
    pub fn new<R: Rng + ?Sized>(anchor: NaiveDateTime, utc_offset_hours: i32, rng: &mut R) -> Self {
        let file = anchor + Duration::milliseconds(rng.random_range(0..=FILE_TIME_JITTER_MS));
        let digitized =
            anchor + Duration::milliseconds(rng.random_range(0..=DIGITIZED_TIME_JITTER_MS));
        Self {
            anchor,
            digitized,
            file,
            sub_sec: rng.random_range(0..=999),
            utc_offset_hours,
        }
    }

    /// The anchor expressed in UTC, for the GPS time stamp.
    pub fn anchor_utc(&self) -> NaiveDateTime {
        self.anchor - Duration::hours(self.utc_offset_hours as i64)
    }
}

/// IFD0: who made the file and how it is laid out.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttributes {
    pub make: String,
    pub model: String,
    pub software: String,
    pub date_time: String,
    pub orientation: u16,
    pub x_resolution: Rational,
    pub y_resolution: Rational,
    /// 2 = inches.
    pub resolution_unit: u16,
}

/// Exif sub-IFD: how the frame was exposed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureAttributes {
    pub date_time_original: String,
    pub date_time_digitized: String,
    pub exposure_time: Rational,
    pub f_number: Rational,
    pub iso: u16,
    /// 2 = normal program.
    pub exposure_program: u16,
    /// 5 = multi-segment.
    pub metering_mode: u16,
    /// 16 = off, did not fire.
    pub flash: u16,
    pub focal_length: Rational,
    pub focal_length_35mm: u16,
    pub aperture_value: Rational,
    pub brightness_value: SignedRational,
    pub shutter_speed_value: SignedRational,
    /// 0 = auto.
    pub white_balance: u16,
    /// 0 = auto.
    pub exposure_mode: u16,
    /// 0 = standard.
    pub scene_capture_type: u16,
    /// 1 = sRGB.
    pub color_space: u16,
    pub pixel_x: u32,
    pub pixel_y: u32,
}

/// GPS sub-IFD.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationAttributes {
    pub latitude: GpsCoordinate,
    pub longitude: GpsCoordinate,
    pub altitude: Rational,
    /// 0 = above sea level.
    pub altitude_ref: u8,
    /// UTC hour, minute, second.
    pub time_stamp: [Rational; 3],
    pub date_stamp: String,
    pub map_datum: String,
}

/// Vendor-style fields layered on top of the base sections.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorExtensions {
    pub lens_make: String,
    pub lens_model: String,
    /// Min focal, max focal, min f-number, max f-number.
    pub lens_info: [Rational; 4],
    pub body_serial: String,
    pub lens_serial: String,
    pub offset_time: String,
    pub offset_time_original: String,
    pub offset_time_digitized: String,
    pub sub_sec_time: String,
    pub sub_sec_time_original: String,
    pub sub_sec_time_digitized: String,
}

/// The full metadata record for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub image: ImageAttributes,
    pub capture: CaptureAttributes,
    pub location: LocationAttributes,
    pub extensions: Option<VendorExtensions>,
    pub times: CaptureTimes,
}

/// A small curated subset of the capture fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimalRecord {
    pub make: String,
    pub model: String,
    pub date_time_original: String,
    pub exposure_time: Rational,
    pub f_number: Rational,
    pub iso: u16,
    pub focal_length: Rational,
}

/// Make, model and capture time only.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicRecord {
    pub make: String,
    pub model: String,
    pub date_time_original: String,
}

/// Levels of metadata completeness, most complete first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Full,
    Clean,
    Minimal,
    Basic,
}

impl Tier {
    /// Base tiers in the order the encoder tries them. `Full` is layered on top of a
    /// successful `Clean` rather than tried on its own.
    pub const LADDER: [Tier; 3] = [Tier::Clean, Tier::Minimal, Tier::Basic];

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Full => "full",
            Tier::Clean => "clean",
            Tier::Minimal => "minimal",
            Tier::Basic => "basic",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The record cut down to one tier, ready to be serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum TierPayload {
    Full(MetadataRecord),
    Clean(MetadataRecord),
    Minimal(MinimalRecord),
    Basic(BasicRecord),
}

impl MetadataRecord {
    /// The record without vendor extensions.
    pub fn clean(&self) -> MetadataRecord {
        MetadataRecord {
            extensions: None,
            ..self.clone()
        }
    }

    pub fn minimal(&self) -> MinimalRecord {
        MinimalRecord {
            make: self.image.make.clone(),
            model: self.image.model.clone(),
            date_time_original: self.capture.date_time_original.clone(),
            exposure_time: self.capture.exposure_time,
            f_number: self.capture.f_number,
            iso: self.capture.iso,
            focal_length: self.capture.focal_length,
        }
    }

    pub fn basic(&self) -> BasicRecord {
        BasicRecord {
            make: self.image.make.clone(),
            model: self.image.model.clone(),
            date_time_original: self.capture.date_time_original.clone(),
        }
    }

    /// Project the record onto `tier`. No randomness is involved, so every tier of the same
    /// record agrees on the values they share.
    pub fn payload(&self, tier: Tier) -> TierPayload {
        match tier {
            Tier::Full => TierPayload::Full(self.clone()),
            Tier::Clean => TierPayload::Clean(self.clean()),
            Tier::Minimal => TierPayload::Minimal(self.minimal()),
            Tier::Basic => TierPayload::Basic(self.basic()),
        }
    }
}

impl TierPayload {
    pub fn tier(&self) -> Tier {
        match self {
            TierPayload::Full(_) => Tier::Full,
            TierPayload::Clean(_) => Tier::Clean,
            TierPayload::Minimal(_) => Tier::Minimal,
            TierPayload::Basic(_) => Tier::Basic,
        }
    }

    /// Reject payloads that would produce a malformed EXIF block.
    pub fn validate(&self) -> Result<()> {
        match self {
            TierPayload::Full(r) | TierPayload::Clean(r) => {
                validate_identity(&r.image.make, &r.image.model)?;
                validate_ascii("Software", &r.image.software)?;
                validate_datetime("DateTime", &r.image.date_time)?;
                validate_datetime("DateTimeOriginal", &r.capture.date_time_original)?;
                validate_datetime("DateTimeDigitized", &r.capture.date_time_digitized)?;
                for (name, v) in [
                    ("XResolution", r.image.x_resolution),
                    ("YResolution", r.image.y_resolution),
                    ("ExposureTime", r.capture.exposure_time),
                    ("FNumber", r.capture.f_number),
                    ("FocalLength", r.capture.focal_length),
                    ("ApertureValue", r.capture.aperture_value),
                    ("GPSAltitude", r.location.altitude),
                ] {
                    validate_rational(name, v)?;
                }
                ensure!(r.capture.brightness_value.denominator != 0, "BrightnessValue has zero denominator");
                ensure!(r.capture.shutter_speed_value.denominator != 0, "ShutterSpeedValue has zero denominator");
                ensure!(r.capture.iso > 0, "ISO must be positive");
                ensure!(
                    r.capture.pixel_x > 0 && r.capture.pixel_y > 0,
                    "Pixel dimensions must be positive"
                );
                validate_gps(&r.location.latitude, 90, ['N', 'S'])?;
                validate_gps(&r.location.longitude, 180, ['E', 'W'])?;
                for v in r.location.time_stamp {
                    validate_rational("GPSTimeStamp", v)?;
                }
                validate_ascii("GPSDateStamp", &r.location.date_stamp)?;

                if let (TierPayload::Full(_), Some(ext)) = (self, &r.extensions) {
                    validate_ascii("LensMake", &ext.lens_make)?;
                    validate_ascii("LensModel", &ext.lens_model)?;
                    validate_ascii("SerialNumber", &ext.body_serial)?;
                    validate_ascii("LensSerialNumber", &ext.lens_serial)?;
                    for v in ext.lens_info {
                        validate_rational("LensInfo", v)?;
                    }
                }
                Ok(())
            }
            TierPayload::Minimal(r) => {
                validate_identity(&r.make, &r.model)?;
                validate_datetime("DateTimeOriginal", &r.date_time_original)?;
                validate_rational("ExposureTime", r.exposure_time)?;
                validate_rational("FNumber", r.f_number)?;
                validate_rational("FocalLength", r.focal_length)?;
                ensure!(r.iso > 0, "ISO must be positive");
                Ok(())
            }
            TierPayload::Basic(r) => {
                validate_identity(&r.make, &r.model)?;
                validate_datetime("DateTimeOriginal", &r.date_time_original)
            }
        }
    }
}

fn validate_identity(make: &str, model: &str) -> Result<()> {
    ensure!(!make.trim().is_empty(), "Make is empty");
    ensure!(!model.trim().is_empty(), "Model is empty");
    validate_ascii("Make", make)?;
    validate_ascii("Model", model)
}

fn validate_ascii(name: &str, value: &str) -> Result<()> {
    ensure!(value.is_ascii(), "{name} is not ASCII: {value:?}");
    ensure!(!value.contains('\0'), "{name} contains a NUL byte");
    Ok(())
}

fn validate_datetime(name: &str, value: &str) -> Result<()> {
    NaiveDateTime::parse_from_str(value, EXIF_DATETIME_FORMAT)
        .map_err(|e| anyhow::anyhow!("{name} is not an EXIF timestamp ({value:?}): {e}"))?;
    Ok(())
}

fn validate_rational(name: &str, value: Rational) -> Result<()> {
    ensure!(value.denominator != 0, "{name} has zero denominator");
    Ok(())
}

fn validate_gps(coord: &GpsCoordinate, max_degrees: u32, refs: [char; 2]) -> Result<()> {
    ensure!(refs.contains(&coord.reference), "Invalid GPS reference {:?}", coord.reference);
    ensure!(coord.dms.degrees <= max_degrees, "GPS degrees out of range: {}", coord.dms.degrees);
    ensure!(coord.dms.minutes < 60, "GPS minutes out of range: {}", coord.dms.minutes);
    ensure!(coord.dms.seconds_x100 < 6000, "GPS seconds out of range: {}", coord.dms.seconds_x100);
    Ok(())
}

/// Assemble the full record for one image.
///
/// `capture_time` is the shutter time as wall-clock time at the session location. All other
/// timestamps are derived from it with bounded jitter; `rng` is only used for that jitter and
/// the shared sub-second value.
pub fn build_record<R: Rng + ?Sized>(
    session: &Session,
    photometric: &PhotometricParameters,
    raster_dims: (u32, u32),
    capture_time: NaiveDateTime,
    rng: &mut R,
) -> MetadataRecord {
    let device = session.device;
    let offset_hours = session.utc_offset_hours();
    let times = CaptureTimes::new(capture_time, offset_hours, rng);

    let image = ImageAttributes {
        make: device.make.to_string(),
        model: device.model.to_string(),
        software: device.firmware.to_string(),
        date_time: times.file.format(EXIF_DATETIME_FORMAT).to_string(),
        orientation: 1,
        x_resolution: Rational::new(DEFAULT_RESOLUTION_DPI, 1),
        y_resolution: Rational::new(DEFAULT_RESOLUTION_DPI, 1),
        resolution_unit: 2,
    };

    let capture = CaptureAttributes {
        date_time_original: times.anchor.format(EXIF_DATETIME_FORMAT).to_string(),
        date_time_digitized: times.digitized.format(EXIF_DATETIME_FORMAT).to_string(),
        exposure_time: Rational::new(1, photometric.exposure_denominator.max(1)),
        f_number: Rational::from_f64(photometric.aperture, 100),
        iso: photometric.iso.min(u16::MAX as u32) as u16,
        exposure_program: 2,
        metering_mode: 5,
        flash: 16,
        focal_length: Rational::from_f64(device.focal_length, 1000),
        focal_length_35mm: device.focal_length_35mm,
        aperture_value: Rational::from_f64(2.0 * photometric.aperture.log2(), 1000),
        brightness_value: photometric.brightness_value,
        shutter_speed_value: photometric.shutter_speed_value,
        white_balance: 0,
        exposure_mode: 0,
        scene_capture_type: 0,
        color_space: 1,
        pixel_x: raster_dims.0,
        pixel_y: raster_dims.1,
    };

    let utc = times.anchor_utc();
    let geo = session.geo_center;
    let location = LocationAttributes {
        latitude: GpsCoordinate::latitude(geo.latitude),
        longitude: GpsCoordinate::longitude(geo.longitude),
        altitude: Rational::from_f64(geo.altitude.abs(), 100),
        altitude_ref: if geo.altitude < 0.0 { 1 } else { 0 },
        time_stamp: [
            Rational::new(utc.hour(), 1),
            Rational::new(utc.minute(), 1),
            Rational::new(utc.second(), 1),
        ],
        date_stamp: utc.format(EXIF_DATE_FORMAT).to_string(),
        map_datum: MAP_DATUM.to_string(),
    };

    let offset = format_utc_offset(offset_hours);
    let sub_sec = format!("{:03}", times.sub_sec);
    let extensions = VendorExtensions {
        lens_make: device.lens_make.to_string(),
        lens_model: device.lens_model.to_string(),
        lens_info: [
            Rational::from_f64(device.focal_range.0, 1000),
            Rational::from_f64(device.focal_range.1, 1000),
            Rational::from_f64(device.aperture_range.0, 100),
            Rational::from_f64(device.aperture_range.1, 100),
        ],
        body_serial: session.device_serial.clone(),
        lens_serial: session.lens_serial.clone(),
        offset_time: offset.clone(),
        offset_time_original: offset.clone(),
        offset_time_digitized: offset,
        sub_sec_time: sub_sec.clone(),
        sub_sec_time_original: sub_sec.clone(),
        sub_sec_time_digitized: sub_sec,
    };

    MetadataRecord {
        image,
        capture,
        location,
        extensions: Some(extensions),
        times,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photometric::parameters_for_luma;
    use crate::session::Session;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .and_then(|d| d.and_hms_opt(15, 9, 26))
            .unwrap()
    }

    fn sample_record(seed: u64) -> (Session, MetadataRecord) {
        let mut rng = StdRng::seed_from_u64(seed);
        let session = Session::create("germany", 450.0, &mut rng);
        let photo = parameters_for_luma(128.0, session.device.aperture, &mut rng);
        let record = build_record(&session, &photo, (100, 80), anchor(), &mut rng);
        (session, record)
    }

    // ── DMS ──────────────────────────────────────────────────────────

    #[test]
    fn dms_san_francisco_latitude() {
        let c = GpsCoordinate::latitude(37.7749);
        assert_eq!(c.reference, 'N');
        assert_eq!(c.dms.degrees, 37);
        assert_eq!(c.dms.minutes, 46);
        // 29.64" with truncation at two fractional digits
        assert!((2963..=2964).contains(&c.dms.seconds_x100), "{}", c.dms.seconds_x100);
    }

    #[test]
    fn dms_hemisphere_from_sign() {
        assert_eq!(GpsCoordinate::latitude(-33.8688).reference, 'S');
        assert_eq!(GpsCoordinate::longitude(-122.4194).reference, 'W');
        assert_eq!(GpsCoordinate::longitude(13.405).reference, 'E');
        assert_eq!(GpsCoordinate::latitude(0.0).reference, 'N');
    }

    #[test]
    fn dms_round_trips_within_rounding() {
        for v in [37.7749, -122.4194, 52.52, -33.8688, 0.0001, 89.9999] {
            let c = GpsCoordinate::latitude(v);
            assert!((c.to_decimal() - v).abs() < 1e-5, "{v} -> {}", c.to_decimal());
        }
    }

    #[test]
    fn dms_seconds_never_reach_sixty() {
        let d = to_dms(10.999_999_999);
        assert!(d.minutes < 60);
        assert!(d.seconds_x100 < 6000);
    }

    // ── offsets ──────────────────────────────────────────────────────

    #[test]
    fn utc_offset_format() {
        assert_eq!(format_utc_offset(1), "+01:00");
        assert_eq!(format_utc_offset(-8), "-08:00");
        assert_eq!(format_utc_offset(0), "+00:00");
        assert_eq!(format_utc_offset(10), "+10:00");
    }

    // ── timestamps ───────────────────────────────────────────────────

    #[test]
    fn timestamps_stay_within_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..500 {
            let t = CaptureTimes::new(anchor(), 1, &mut rng);
            let file_ms = (t.file - t.anchor).num_milliseconds();
            let dig_ms = (t.digitized - t.anchor).num_milliseconds();
            assert!((0..=FILE_TIME_JITTER_MS).contains(&file_ms));
            assert!((0..=DIGITIZED_TIME_JITTER_MS).contains(&dig_ms));
            assert!(t.sub_sec <= 999);
        }
    }

    #[test]
    fn sub_second_fields_are_identical() {
        for seed in 0..20 {
            let (_, record) = sample_record(seed);
            let ext = record.extensions.as_ref().unwrap();
            assert_eq!(ext.sub_sec_time, ext.sub_sec_time_original);
            assert_eq!(ext.sub_sec_time, ext.sub_sec_time_digitized);
            assert_eq!(ext.sub_sec_time, format!("{:03}", record.times.sub_sec));
        }
    }

    #[test]
    fn record_timestamps_derive_from_anchor() {
        let (_, record) = sample_record(4);
        assert_eq!(record.capture.date_time_original, "2026:03:14 15:09:26");
        let parse = |s: &str| NaiveDateTime::parse_from_str(s, EXIF_DATETIME_FORMAT).unwrap();
        let original = parse(&record.capture.date_time_original);
        // Second-resolution strings can only move forward by at most one second
        for s in [&record.capture.date_time_digitized, &record.image.date_time] {
            let delta = (parse(s) - original).num_seconds();
            assert!((0..=1).contains(&delta), "{s}");
        }
    }

    #[test]
    fn gps_time_is_utc() {
        let (session, record) = sample_record(4);
        let offset = session.utc_offset_hours();
        // Germany spans UTC+0 (by longitude) to UTC+1
        assert!((0..=1).contains(&offset));
        assert_eq!(record.location.time_stamp[0], Rational::new((15 - offset) as u32, 1));
        assert_eq!(record.location.time_stamp[1], Rational::new(9, 1));
        assert_eq!(record.location.date_stamp, "2026:03:14");
        let ext = record.extensions.as_ref().unwrap();
        assert_eq!(ext.offset_time, format_utc_offset(offset));
    }

    // ── record content ───────────────────────────────────────────────

    #[test]
    fn record_uses_session_identity() {
        let (session, record) = sample_record(12);
        assert_eq!(record.image.make, "Apple");
        assert_eq!(record.image.model, session.device.model);
        let ext = record.extensions.as_ref().unwrap();
        assert_eq!(ext.body_serial, session.device_serial);
        assert_eq!(ext.lens_serial, session.lens_serial);
        assert_eq!(record.capture.pixel_x, 100);
        assert_eq!(record.capture.pixel_y, 80);
        let lat = record.location.latitude.to_decimal();
        assert!((lat - session.geo_center.latitude).abs() < 1e-5);
    }

    #[test]
    fn exposure_fields_follow_photometric_values() {
        let mut rng = StdRng::seed_from_u64(21);
        let session = Session::create("usa", 450.0, &mut rng);
        let photo = parameters_for_luma(30.0, session.device.aperture, &mut rng);
        let record = build_record(&session, &photo, (10, 10), anchor(), &mut rng);
        assert_eq!(record.capture.exposure_time, Rational::new(1, photo.exposure_denominator));
        assert_eq!(record.capture.iso as u32, photo.iso);
        assert_eq!(record.capture.f_number, Rational::new(178, 100));
        assert_eq!(record.capture.brightness_value, photo.brightness_value);
    }

    // ── tiers ────────────────────────────────────────────────────────

    #[test]
    fn tiers_are_deterministic_projections() {
        let (_, record) = sample_record(5);
        assert_eq!(record.payload(Tier::Clean), record.payload(Tier::Clean));

        let TierPayload::Clean(clean) = record.payload(Tier::Clean) else {
            panic!("expected clean payload");
        };
        assert!(clean.extensions.is_none());
        assert_eq!(clean.capture, record.capture);

        let TierPayload::Minimal(min) = record.payload(Tier::Minimal) else {
            panic!("expected minimal payload");
        };
        assert_eq!(min.date_time_original, record.capture.date_time_original);
        assert_eq!(min.iso, record.capture.iso);

        let TierPayload::Basic(basic) = record.payload(Tier::Basic) else {
            panic!("expected basic payload");
        };
        assert_eq!(basic.make, record.image.make);
        assert_eq!(basic.model, record.image.model);
        assert_eq!(basic.date_time_original, record.capture.date_time_original);
    }

    #[test]
    fn every_tier_of_a_built_record_validates() {
        let (_, record) = sample_record(6);
        for tier in [Tier::Full, Tier::Clean, Tier::Minimal, Tier::Basic] {
            let payload = record.payload(tier);
            assert_eq!(payload.tier(), tier);
            payload.validate().unwrap();
        }
    }

    #[test]
    fn validation_rejects_broken_fields() {
        let (_, mut record) = sample_record(6);
        record.image.model = "iPhone\u{00e9}".to_string();
        assert!(record.payload(Tier::Clean).validate().is_err());
        assert!(record.payload(Tier::Basic).validate().is_err());

        let (_, mut record) = sample_record(6);
        record.capture.exposure_time.denominator = 0;
        assert!(record.payload(Tier::Clean).validate().is_err());
        assert!(record.payload(Tier::Minimal).validate().is_err());
        // Basic does not carry exposure data
        assert!(record.payload(Tier::Basic).validate().is_ok());
    }
}
