//! EXIF record building, writing, and reading.
//!
//! - [`build_record`]: Assemble the typed metadata record for one image
//! - [`Embedder`]: Encode a raster to JPEG and embed the best tier that survives
//! - [`read_exif`]: Read a written file back for checking

mod reader;
mod record;
mod writer;

pub use reader::{ExifData, read_exif, read_exif_bytes};
pub use record::{
    BasicRecord, CaptureAttributes, CaptureTimes, Dms, EXIF_DATETIME_FORMAT, GpsCoordinate,
    ImageAttributes, LocationAttributes, MetadataRecord, MinimalRecord, Rational, Tier,
    TierPayload, VendorExtensions, build_record, format_utc_offset, to_dms,
};
pub use writer::{
    APP1_MAX_LENGTH, EmbedStrategy, Embedder, EncodeReport, ExifSerializer,
    TiffSerializer, check_segment, encode_jpeg, has_exif,
};
