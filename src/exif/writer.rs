use ::exif::experimental::Writer as TiffWriter;
use ::exif::{Field, In, Tag, Value};
use anyhow::{Context, Result, anyhow, bail, ensure};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use serde::Serialize;
use std::io::Cursor;
use std::panic::AssertUnwindSafe;

use super::reader::read_exif_bytes;
use super::record::{
    BasicRecord, CaptureAttributes, ImageAttributes, LocationAttributes, MetadataRecord,
    MinimalRecord, Rational, Tier, TierPayload, VendorExtensions,
};
use crate::photometric::SignedRational;

// APP1 segment layout: [FF E1][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() and JpegEncoder::set_exif_metadata() take just the TIFF data
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6
const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const APP1_MARKER: [u8; 2] = [0xFF, 0xE1];

/// Largest value the 16-bit APP1 length field can hold (it counts itself).
pub const APP1_MAX_LENGTH: usize = u16::MAX as usize;

const EXIF_VERSION: &[u8] = b"0232";

/// How the EXIF segment ended up in the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedStrategy {
    /// Handed to the JPEG encoder and written with the image.
    Inline,
    /// Spliced into an already-encoded JPEG.
    Splice,
}

/// Output of one encode: the JPEG bytes plus what metadata made it in.
#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub bytes: Vec<u8>,
    /// `None` when every tier failed and the image was encoded without EXIF.
    pub tier: Option<Tier>,
    pub strategy: Option<EmbedStrategy>,
    /// Whether the tier's key fields could be parsed back out of `bytes`.
    pub verified: bool,
}

/// Turns a tier payload into a complete JPEG APP1 segment
/// (`FF E1`, big-endian length, `Exif\0\0`, TIFF body).
pub trait ExifSerializer: Send + Sync {
    fn serialize(&self, payload: &TierPayload) -> Result<Vec<u8>>;
}

/// [`ExifSerializer`] backed by kamadak-exif's TIFF writer. Writes IFD0, the Exif IFD and
/// the GPS IFD.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffSerializer;

impl ExifSerializer for TiffSerializer {
    fn serialize(&self, payload: &TierPayload) -> Result<Vec<u8>> {
        payload.validate()?;
        let fields = payload_fields(payload);
        let field_count = fields.len();

        // a writer panic counts as a tier failure
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut writer = TiffWriter::new();
            for field in &fields {
                writer.push_field(field);
            }
            let mut tiff = Cursor::new(Vec::new());
            writer.write(&mut tiff, true)?;
            Ok::<_, ::exif::Error>(tiff.into_inner())
        }));

        let tiff = match result {
            Ok(Ok(tiff)) => tiff,
            Ok(Err(e)) => bail!("Failed to write {} tier: {e}", payload.tier()),
            Err(_) => bail!("EXIF writer panicked serializing {} tier", payload.tier()),
        };
        let segment = app1_segment(&tiff)?;
        log::debug!(
            "  Serialized {} tier: {field_count} fields, {} bytes",
            payload.tier(),
            segment.len()
        );
        Ok(segment)
    }
}

/// Wrap a TIFF body in an APP1 segment.
fn app1_segment(tiff: &[u8]) -> Result<Vec<u8>> {
    let length = 2 + EXIF_PREFIX.len() + tiff.len();
    ensure!(
        length <= APP1_MAX_LENGTH,
        "EXIF segment too large: {length} bytes (max {APP1_MAX_LENGTH})"
    );
    let mut segment = Vec::with_capacity(length + 2);
    segment.extend_from_slice(&APP1_MARKER);
    segment.extend_from_slice(&(length as u16).to_be_bytes());
    segment.extend_from_slice(EXIF_PREFIX);
    segment.extend_from_slice(tiff);
    check_segment(&segment)?;
    Ok(segment)
}

/// Structural check on a serialized APP1 segment.
pub fn check_segment(segment: &[u8]) -> Result<()> {
    ensure!(
        segment.len() > JPEG_EXIF_OVERHEAD,
        "EXIF serializer produced no data ({} bytes)",
        segment.len()
    );
    ensure!(segment[..2] == APP1_MARKER, "EXIF segment does not start with APP1");
    ensure!(segment[4..10] == *EXIF_PREFIX, "EXIF segment is missing the Exif header");
    let length = segment.len() - 2;
    ensure!(
        length <= APP1_MAX_LENGTH,
        "EXIF segment too large: {length} bytes (max {APP1_MAX_LENGTH})"
    );
    let declared = u16::from_be_bytes([segment[2], segment[3]]) as usize;
    ensure!(
        declared == length,
        "EXIF segment length field is {declared}, actual {length}"
    );
    Ok(())
}

/// Encodes rasters to JPEG and embeds the best metadata tier that survives serialization.
pub struct Embedder<S = TiffSerializer> {
    serializer: S,
    quality: u8,
}

impl Embedder<TiffSerializer> {
    pub fn new(quality: u8) -> Self {
        Self::with_serializer(TiffSerializer, quality)
    }
}

impl<S: ExifSerializer> Embedder<S> {
    pub fn with_serializer(serializer: S, quality: u8) -> Self {
        Self {
            serializer,
            quality: quality.clamp(1, 100),
        }
    }

    /// Encode `raster` as JPEG carrying as much of `record` as possible.
    ///
    /// Tiers are tried clean, minimal, basic; a clean tier that serializes is upgraded to
    /// full when the vendor extensions serialize too. Each candidate is embedded inline
    /// first and spliced if that leaves no EXIF behind. When no tier can be embedded the
    /// image is still encoded, without metadata. Only a failure to encode the raster itself
    /// is an error.
    pub fn encode(&self, raster: &RgbImage, record: &MetadataRecord) -> Result<EncodeReport> {
        for tier in Tier::LADDER {
            let Some(segment) = self.serialize_tier(record, tier) else {
                continue;
            };
            if tier == Tier::Clean && record.extensions.is_some() {
                if let Some(full) = self.serialize_tier(record, Tier::Full) {
                    if let Some(report) = self.try_embed(raster, Tier::Full, &full) {
                        return Ok(report);
                    }
                }
            }
            if let Some(report) = self.try_embed(raster, tier, &segment) {
                return Ok(report);
            }
        }

        log::warn!("  All metadata tiers failed, writing image without EXIF");
        Ok(EncodeReport {
            bytes: encode_jpeg(raster, self.quality)?,
            tier: None,
            strategy: None,
            verified: false,
        })
    }

    fn try_embed(&self, raster: &RgbImage, tier: Tier, segment: &[u8]) -> Option<EncodeReport> {
        match self.embed(raster, segment) {
            Ok((bytes, strategy)) => {
                let verified = verify(&bytes, tier);
                log::debug!("  Embedded {tier} tier ({strategy:?}), verified: {verified}");
                Some(EncodeReport {
                    bytes,
                    tier: Some(tier),
                    strategy: Some(strategy),
                    verified,
                })
            }
            Err(e) => {
                log::warn!("  Could not embed {tier} tier: {e:#}");
                None
            }
        }
    }

    fn serialize_tier(&self, record: &MetadataRecord, tier: Tier) -> Option<Vec<u8>> {
        match self.serializer.serialize(&record.payload(tier)) {
            Ok(segment) => Some(segment),
            Err(e) => {
                log::warn!("  {tier} tier rejected: {e:#}");
                None
            }
        }
    }

    fn embed(&self, raster: &RgbImage, segment: &[u8]) -> Result<(Vec<u8>, EmbedStrategy)> {
        match encode_with_segment(raster, self.quality, segment) {
            Ok(bytes) if has_exif(&bytes) => return Ok((bytes, EmbedStrategy::Inline)),
            Ok(_) => log::debug!("  Inline EXIF not found after encode, splicing instead"),
            Err(e) => log::debug!("  Inline EXIF failed ({e:#}), splicing instead"),
        }

        let plain = encode_jpeg(raster, self.quality)?;
        let spliced = splice_segment(plain, segment)?;
        ensure!(has_exif(&spliced), "EXIF missing after splice");
        Ok((spliced, EmbedStrategy::Splice))
    }
}

/// Plain JPEG encode, no metadata.
pub fn encode_jpeg(raster: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(raster)
        .context("Failed to encode JPEG")?;
    Ok(out)
}

/// Encode `raster` with `segment` passed to the encoder as its EXIF block.
pub fn encode_with_segment(raster: &RgbImage, quality: u8, segment: &[u8]) -> Result<Vec<u8>> {
    check_segment(segment)?;
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .set_exif_metadata(segment[JPEG_EXIF_OVERHEAD..].to_vec())
        .map_err(|e| anyhow!("JPEG encoder rejected EXIF: {e}"))?;
    encoder
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )
        .context("Failed to encode JPEG")?;
    Ok(out)
}

/// Replace (or add) the EXIF segment of an encoded JPEG.
pub fn splice_segment(jpeg_bytes: Vec<u8>, segment: &[u8]) -> Result<Vec<u8>> {
    check_segment(segment)?;
    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_bytes))
        .map_err(|e| anyhow!("Failed to parse JPEG: {e}"))?;
    jpeg.set_exif(Some(Bytes::copy_from_slice(&segment[JPEG_EXIF_OVERHEAD..])));
    Ok(jpeg.encoder().bytes().to_vec())
}

/// Whether an encoded JPEG carries an EXIF APP1 segment.
pub fn has_exif(bytes: &[u8]) -> bool {
    Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
        .map(|jpeg| jpeg.exif().is_some())
        .unwrap_or(false)
}

/// Read the EXIF block back with an independent parser. Clean and full tiers must also
/// carry their GPS block.
fn verify(bytes: &[u8], tier: Tier) -> bool {
    let data = match read_exif_bytes(bytes) {
        Ok(data) => data,
        Err(e) => {
            log::debug!("  Read-back failed: {e:#}");
            return false;
        }
    };
    if data.make.is_none() {
        log::debug!("  Read-back found no Make tag");
        return false;
    }
    if matches!(tier, Tier::Full | Tier::Clean) && !data.has_gps {
        log::warn!("  Read-back found no GPS block in {tier} tier");
        return false;
    }
    true
}

// ============================================================================
// Field mapping
// ============================================================================

fn payload_fields(payload: &TierPayload) -> Vec<Field> {
    let mut fields = Vec::new();
    match payload {
        TierPayload::Full(record) | TierPayload::Clean(record) => {
            image_fields(&mut fields, &record.image);
            capture_fields(&mut fields, &record.capture);
            location_fields(&mut fields, &record.location);
            if let (TierPayload::Full(_), Some(ext)) = (payload, &record.extensions) {
                extension_fields(&mut fields, ext);
            }
        }
        TierPayload::Minimal(record) => minimal_fields(&mut fields, record),
        TierPayload::Basic(record) => basic_fields(&mut fields, record),
    }
    fields
}

fn image_fields(fields: &mut Vec<Field>, image: &ImageAttributes) {
    fields.push(ascii(Tag::Make, &image.make));
    fields.push(ascii(Tag::Model, &image.model));
    fields.push(ascii(Tag::Software, &image.software));
    fields.push(ascii(Tag::DateTime, &image.date_time));
    fields.push(short(Tag::Orientation, image.orientation));
    fields.push(rational(Tag::XResolution, &[image.x_resolution]));
    fields.push(rational(Tag::YResolution, &[image.y_resolution]));
    fields.push(short(Tag::ResolutionUnit, image.resolution_unit));
}

fn capture_fields(fields: &mut Vec<Field>, capture: &CaptureAttributes) {
    fields.push(field(Tag::ExifVersion, Value::Undefined(EXIF_VERSION.to_vec(), 0)));
    fields.push(ascii(Tag::DateTimeOriginal, &capture.date_time_original));
    fields.push(ascii(Tag::DateTimeDigitized, &capture.date_time_digitized));
    fields.push(rational(Tag::ExposureTime, &[capture.exposure_time]));
    fields.push(rational(Tag::FNumber, &[capture.f_number]));
    fields.push(short(Tag::PhotographicSensitivity, capture.iso));
    fields.push(short(Tag::ExposureProgram, capture.exposure_program));
    fields.push(short(Tag::MeteringMode, capture.metering_mode));
    fields.push(short(Tag::Flash, capture.flash));
    fields.push(rational(Tag::FocalLength, &[capture.focal_length]));
    fields.push(short(Tag::FocalLengthIn35mmFilm, capture.focal_length_35mm));
    fields.push(rational(Tag::ApertureValue, &[capture.aperture_value]));
    fields.push(srational(Tag::BrightnessValue, capture.brightness_value));
    fields.push(srational(Tag::ShutterSpeedValue, capture.shutter_speed_value));
    fields.push(short(Tag::WhiteBalance, capture.white_balance));
    fields.push(short(Tag::ExposureMode, capture.exposure_mode));
    fields.push(short(Tag::SceneCaptureType, capture.scene_capture_type));
    fields.push(short(Tag::ColorSpace, capture.color_space));
    fields.push(long(Tag::PixelXDimension, capture.pixel_x));
    fields.push(long(Tag::PixelYDimension, capture.pixel_y));
}

fn location_fields(fields: &mut Vec<Field>, location: &LocationAttributes) {
    fields.push(ascii(Tag::GPSLatitudeRef, &location.latitude.reference.to_string()));
    fields.push(rational(Tag::GPSLatitude, &location.latitude.dms.rationals()));
    fields.push(ascii(Tag::GPSLongitudeRef, &location.longitude.reference.to_string()));
    fields.push(rational(Tag::GPSLongitude, &location.longitude.dms.rationals()));
    fields.push(field(Tag::GPSAltitudeRef, Value::Byte(vec![location.altitude_ref])));
    fields.push(rational(Tag::GPSAltitude, &[location.altitude]));
    fields.push(rational(Tag::GPSTimeStamp, &location.time_stamp));
    fields.push(ascii(Tag::GPSDateStamp, &location.date_stamp));
    fields.push(ascii(Tag::GPSMapDatum, &location.map_datum));
}

fn extension_fields(fields: &mut Vec<Field>, ext: &VendorExtensions) {
    fields.push(ascii(Tag::LensMake, &ext.lens_make));
    fields.push(ascii(Tag::LensModel, &ext.lens_model));
    fields.push(rational(Tag::LensSpecification, &ext.lens_info));
    fields.push(ascii(Tag::BodySerialNumber, &ext.body_serial));
    fields.push(ascii(Tag::LensSerialNumber, &ext.lens_serial));
    fields.push(ascii(Tag::OffsetTime, &ext.offset_time));
    fields.push(ascii(Tag::OffsetTimeOriginal, &ext.offset_time_original));
    fields.push(ascii(Tag::OffsetTimeDigitized, &ext.offset_time_digitized));
    fields.push(ascii(Tag::SubSecTime, &ext.sub_sec_time));
    fields.push(ascii(Tag::SubSecTimeOriginal, &ext.sub_sec_time_original));
    fields.push(ascii(Tag::SubSecTimeDigitized, &ext.sub_sec_time_digitized));
}

fn minimal_fields(fields: &mut Vec<Field>, record: &MinimalRecord) {
    fields.push(ascii(Tag::Make, &record.make));
    fields.push(ascii(Tag::Model, &record.model));
    fields.push(ascii(Tag::DateTimeOriginal, &record.date_time_original));
    fields.push(rational(Tag::ExposureTime, &[record.exposure_time]));
    fields.push(rational(Tag::FNumber, &[record.f_number]));
    fields.push(short(Tag::PhotographicSensitivity, record.iso));
    fields.push(rational(Tag::FocalLength, &[record.focal_length]));
}

fn basic_fields(fields: &mut Vec<Field>, record: &BasicRecord) {
    fields.push(ascii(Tag::Make, &record.make));
    fields.push(ascii(Tag::Model, &record.model));
    fields.push(ascii(Tag::DateTimeOriginal, &record.date_time_original));
}

// The writer files each tag under its own IFD (Exif, GPS) from the tag itself.
fn field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn ascii(tag: Tag, text: &str) -> Field {
    field(tag, Value::Ascii(vec![text.as_bytes().to_vec()]))
}

fn short(tag: Tag, value: u16) -> Field {
    field(tag, Value::Short(vec![value]))
}

fn long(tag: Tag, value: u32) -> Field {
    field(tag, Value::Long(vec![value]))
}

fn rational(tag: Tag, values: &[Rational]) -> Field {
    let values = values
        .iter()
        .map(|r| ::exif::Rational {
            num: r.numerator,
            denom: r.denominator,
        })
        .collect();
    field(tag, Value::Rational(values))
}

fn srational(tag: Tag, value: SignedRational) -> Field {
    field(
        tag,
        Value::SRational(vec![::exif::SRational {
            num: value.numerator,
            denom: value.denominator,
        }]),
    )
}
