use anyhow::{Context, Result};
use nom_exif::*;
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

/// The subset of EXIF fields used to check a written file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExifData {
    pub make: Option<String>,
    pub model: Option<String>,
    pub software: Option<String>,
    pub date_time_original: Option<String>,
    pub lens_model: Option<String>,
    pub iso: Option<String>,
    pub has_gps: bool,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

impl ExifData {
    /// Whether any field at all was found.
    pub fn is_empty(&self) -> bool {
        *self == ExifData::default()
    }
}

/// Read EXIF data from an image file. Files without EXIF give an empty [`ExifData`].
pub fn read_exif(path: &Path) -> Result<ExifData> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path).context("Failed to open image file")?;
    let parsed: Result<ExifIter, _> = parser.parse(ms);
    let data = match parsed {
        Ok(iter) => extract(iter),
        Err(e) => {
            log::trace!("nom-exif: {e}");
            ExifData::default()
        }
    };
    if data.is_empty() {
        log::debug!("No EXIF data found in {}", path.display());
    }
    Ok(data)
}

/// Read EXIF data from an in-memory encoded image.
pub fn read_exif_bytes(bytes: &[u8]) -> Result<ExifData> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::seekable(Cursor::new(bytes.to_vec()))
        .context("Failed to open image buffer")?;
    let parsed: Result<ExifIter, _> = parser.parse(ms);
    Ok(match parsed {
        Ok(iter) => extract(iter),
        Err(e) => {
            log::trace!("nom-exif: {e}");
            ExifData::default()
        }
    })
}

fn extract(iter: ExifIter) -> ExifData {
    // GPS first: converting to Exif consumes the iterator
    let gps_info = iter.parse_gps_info().ok().flatten();
    let exif: Exif = iter.into();

    let text = |tag: ExifTag| exif.get(tag).and_then(entry_to_string);
    let mut data = ExifData {
        make: text(ExifTag::Make),
        model: text(ExifTag::Model),
        software: text(ExifTag::Software),
        date_time_original: text(ExifTag::DateTimeOriginal),
        lens_model: text(ExifTag::LensModel),
        iso: text(ExifTag::ISOSpeedRatings),
        ..ExifData::default()
    };

    if let Some(gps) = gps_info {
        data.has_gps = true;
        data.gps_latitude = Some(latlng_to_decimal(&gps.latitude, gps.latitude_ref));
        data.gps_longitude = Some(latlng_to_decimal(&gps.longitude, gps.longitude_ref));
    }

    data
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// Convert a nom-exif LatLng (3 URationals: deg, min, sec) to decimal degrees.
fn latlng_to_decimal(latlng: &LatLng, reference: char) -> f64 {
    dms_to_decimal(
        [
            (latlng.0.0, latlng.0.1),
            (latlng.1.0, latlng.1.1),
            (latlng.2.0, latlng.2.1),
        ],
        reference,
    )
}

fn dms_to_decimal(parts: [(u32, u32); 3], reference: char) -> f64 {
    let [d, m, s] = parts.map(|(n, d)| if d == 0 { 0.0 } else { n as f64 / d as f64 });
    let coord = d + m / 60.0 + s / 3600.0;
    if reference == 'S' || reference == 'W' { -coord } else { coord }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_read_as_empty() {
        let data = read_exif_bytes(b"not an image at all").unwrap_or_default();
        assert!(data.is_empty());
        assert!(!data.has_gps);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_exif(Path::new("/nonexistent/photo.jpg")).is_err());
    }

    #[test]
    fn latlng_hemispheres() {
        let parts = [(52, 1), (31, 1), (1200, 100)];
        assert!((dms_to_decimal(parts, 'N') - 52.52).abs() < 1e-9);
        assert!((dms_to_decimal(parts, 'S') + 52.52).abs() < 1e-9);
        assert_eq!(dms_to_decimal([(1, 0), (0, 0), (0, 0)], 'E'), 0.0);
    }
}
