use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::ai::{self, TextRewriter};
use crate::config::Config;
use crate::exif::{EmbedStrategy, Embedder, Tier, build_record};
use crate::normalize::Normalizer;
use crate::photometric;
use crate::session::{Session, SessionSlot};

/// Input extensions the decoder is built for.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Seconds between consecutive shots in a batch.
pub const MIN_SHOT_SPACING_S: i64 = 2;
pub const MAX_SHOT_SPACING_S: i64 = 40;

/// Extra look-back before the first shot so the last one still lands in the past.
const ANCHOR_LOOKBACK_S: std::ops::RangeInclusive<i64> = 300..=3600;

/// One raw input image.
#[derive(Debug, Clone)]
pub struct InputImage {
    /// Original file name, for reporting only.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputImage {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// A batch of images that should look like one shooting session.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub images: Vec<InputImage>,
    /// Region key; `None` uses `session.default_region` from the config.
    pub region: Option<String>,
    /// Caller identifier. Only used to name the output bundle.
    pub batch_token: String,
    /// Product text to run through the rewriters.
    pub description: Option<String>,
}

/// Result for one input image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageOutcome {
    /// 1-based position in the request.
    pub index: usize,
    pub source_name: String,
    pub filename: Option<String>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub tier: Option<Tier>,
    pub strategy: Option<EmbedStrategy>,
    pub verified: bool,
    pub error: Option<String>,
}

impl ImageOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(index: usize, source_name: &str, error: String) -> Self {
        Self {
            index,
            source_name: source_name.to_string(),
            filename: None,
            bytes: Vec::new(),
            tier: None,
            strategy: None,
            verified: false,
            error: Some(error),
        }
    }
}

/// Everything a batch produced, plus the identity it was stamped with.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_token: String,
    /// Directory / archive stem for the outputs, `{token}_product`.
    pub bundle_name: String,
    pub region: String,
    pub city: String,
    pub device_model: String,
    pub device_serial: String,
    pub lens_serial: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Rewritten description (or the original when rewriting was skipped or failed).
    pub description: Option<String>,
    pub original_description: Option<String>,
    pub outcomes: Vec<ImageOutcome>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks) and their files sorted by path, so a batch is
/// always numbered in the same order.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_supported_image(p))
                .collect();
            found.sort();
            images.extend(found);
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Build the text rewriter failover chain from configuration.
///
/// Services are taken in `service_order`; disabled services and services without an
/// API key are skipped.
pub fn build_rewriter_chain(config: &Config) -> Vec<Box<dyn TextRewriter>> {
    let mut services: Vec<Box<dyn TextRewriter>> = Vec::new();

    for name in &config.service_order {
        match name.as_str() {
            "gemini" if config.ai_services.gemini.enabled => {
                if config.ai_services.gemini.api_key.is_empty() {
                    log::warn!("Gemini enabled but no API key configured");
                    continue;
                }
                services.push(Box::new(ai::GeminiRewriter::new(
                    config.ai_services.gemini.api_key.clone(),
                    config.ai_services.gemini.model.clone(),
                )));
            }
            "openai" if config.ai_services.openai.enabled => {
                if config.ai_services.openai.api_key.is_empty() {
                    log::warn!("OpenAI enabled but no API key configured");
                    continue;
                }
                services.push(Box::new(ai::OpenAiRewriter::new(
                    config.ai_services.openai.api_key.clone(),
                    config.ai_services.openai.model.clone(),
                )));
            }
            _ => {}
        }
    }

    services
}

/// Output filename: `{prefix}{YYYYMMDD_HHMMSS}_{index:04}.jpg`.
pub fn output_filename(prefix: &str, capture_time: &NaiveDateTime, index: usize) -> String {
    format!("{prefix}{}_{index:04}.jpg", capture_time.format("%Y%m%d_%H%M%S"))
}

/// Bundle stem for a batch token; anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn bundle_name(batch_token: &str) -> String {
    let token: String = batch_token
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if token.is_empty() {
        "batch_product".to_string()
    } else {
        format!("{token}_product")
    }
}

/// Process one batch.
///
/// 1. **Session**: a fresh batch-scoped session (device, serials, location)
/// 2. **Describe**: rewrite the description through `rewriters`, keeping the original on failure
/// 3. **Images**: normalize, derive exposure, build the record, encode with EXIF, name
///
/// Image failures are reported per image and never abort the batch. Pass a `seed` for
/// reproducible sessions and exposure values.
///
/// # Example
///
/// ```rust,no_run
/// use exif_session::config::Config;
/// use exif_session::pipeline::{BatchRequest, InputImage, build_rewriter_chain, process_batch};
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load(Some("config.json".as_ref()))?;
/// let rewriters = build_rewriter_chain(&config);
/// let request = BatchRequest {
///     images: vec![InputImage::from_path(Path::new("front.png"))?],
///     region: Some("germany".into()),
///     batch_token: "alice".into(),
///     description: Some("Hand-thrown stoneware mug".into()),
/// };
///
/// let result = process_batch(request, &rewriters, &config, None).await;
/// println!("{} of {} images encoded", result.succeeded(), result.total());
/// # Ok(())
/// # }
/// ```
pub async fn process_batch(
    request: BatchRequest,
    rewriters: &[Box<dyn TextRewriter>],
    config: &Config,
    seed: Option<u64>,
) -> BatchResult {
    let description = match request.description.as_deref() {
        Some(text) => Some(ai::rewrite_description(rewriters, text).await),
        None => None,
    };

    let mut result = process_images(&request, config, seed);
    result.original_description = request.description;
    result.description = description;
    result
}

/// The synchronous image half of [`process_batch`], without text rewriting.
pub fn process_images(request: &BatchRequest, config: &Config, seed: Option<u64>) -> BatchResult {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let region = request
        .region
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(&config.session.default_region);

    let mut slot = SessionSlot::new(config.session.jitter_radius_m);
    slot.reset();
    let session = slot.get_or_create(region, &mut rng).clone();

    let normalizer = Normalizer::from_config(&config.encoding);
    let embedder = Embedder::new(config.encoding.jpeg_quality);

    let total = request.images.len();
    let mut capture_time = batch_anchor(&session, total, &mut rng);
    let mut outcomes = Vec::with_capacity(total);

    for (i, image) in request.images.iter().enumerate() {
        let index = i + 1;
        log::info!("[{index}/{total}] Processing: {}", image.name);

        let outcome = process_one(
            index,
            image,
            &session,
            capture_time,
            &normalizer,
            &embedder,
            config,
            &mut rng,
        );
        match &outcome.error {
            None => log::info!(
                "  -> {} ({} tier)",
                outcome.filename.as_deref().unwrap_or_default(),
                outcome.tier.map(|t| t.name()).unwrap_or("no"),
            ),
            Some(e) => log::error!("  Failed: {e}"),
        }
        outcomes.push(outcome);

        capture_time += Duration::seconds(rng.random_range(MIN_SHOT_SPACING_S..=MAX_SHOT_SPACING_S));
    }

    BatchResult {
        batch_token: request.batch_token.clone(),
        bundle_name: bundle_name(&request.batch_token),
        region: session.region.key.to_string(),
        city: session.city.name.to_string(),
        device_model: session.device.model.to_string(),
        device_serial: session.device_serial.clone(),
        lens_serial: session.lens_serial.clone(),
        latitude: session.geo_center.latitude,
        longitude: session.geo_center.longitude,
        description: None,
        original_description: None,
        outcomes,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_one(
    index: usize,
    image: &InputImage,
    session: &Session,
    capture_time: NaiveDateTime,
    normalizer: &Normalizer,
    embedder: &Embedder,
    config: &Config,
    rng: &mut StdRng,
) -> ImageOutcome {
    let raster = match normalizer.normalize(&image.bytes) {
        Ok(raster) => raster,
        Err(e) => return ImageOutcome::failed(index, &image.name, format!("{e:#}")),
    };

    let photo = photometric::derive_parameters(&raster, session.device.aperture, rng);
    let record = build_record(session, &photo, raster.dimensions(), capture_time, rng);

    let report = match embedder.encode(&raster, &record) {
        Ok(report) => report,
        Err(e) => return ImageOutcome::failed(index, &image.name, format!("{e:#}")),
    };

    ImageOutcome {
        index,
        source_name: image.name.clone(),
        filename: Some(output_filename(&config.output.filename_prefix, &capture_time, index)),
        bytes: report.bytes,
        tier: report.tier,
        strategy: report.strategy,
        verified: report.verified,
        error: None,
    }
}

/// Local wall-clock time of the first shot, far enough back that every later shot is
/// still in the past.
fn batch_anchor<R: Rng + ?Sized>(session: &Session, image_count: usize, rng: &mut R) -> NaiveDateTime {
    let local_now = Utc::now().naive_utc() + Duration::hours(session.utc_offset_hours() as i64);
    let lookback = image_count as i64 * MAX_SHOT_SPACING_S + rng.random_range(ANCHOR_LOOKBACK_S);
    local_now - Duration::seconds(lookback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png(w: u32, h: u32, level: u8) -> InputImage {
        let raster = RgbImage::from_pixel(w, h, Rgb([level, level, level]));
        let mut buf = Cursor::new(Vec::new());
        raster.write_to(&mut buf, ImageFormat::Png).unwrap();
        InputImage {
            name: format!("gray_{level}.png"),
            bytes: buf.into_inner(),
        }
    }

    fn request(images: Vec<InputImage>) -> BatchRequest {
        BatchRequest {
            images,
            region: Some("germany".into()),
            batch_token: "tester".into(),
            description: None,
        }
    }

    // ── is_supported_image ───────────────────────────────────────────

    #[test]
    fn supported_image_extensions() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
    }

    #[test]
    fn unsupported_image_extensions() {
        assert!(!is_supported_image(Path::new("doc.pdf")));
        assert!(!is_supported_image(Path::new("photo.heic")));
        assert!(!is_supported_image(Path::new("readme.txt")));
        assert!(!is_supported_image(Path::new("noext")));
    }

    // ── collect_images ───────────────────────────────────────────────

    #[test]
    fn collect_images_single_file() {
        let dir = TempDir::new().unwrap();
        let jpg = dir.path().join("test.jpg");
        fs::write(&jpg, b"fake").unwrap();

        let images = collect_images(&[jpg.clone()]);
        assert_eq!(images, vec![jpg]);
    }

    #[test]
    fn collect_images_directory_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        fs::write(dir.path().join("b.jpg"), b"fake").unwrap();
        fs::write(dir.path().join("a.jpg"), b"fake").unwrap();
        fs::write(sub.join("c.png"), b"fake").unwrap();
        fs::write(sub.join("d.txt"), b"fake").unwrap();

        let images = collect_images(&[dir.path().to_path_buf()]);
        assert_eq!(images.len(), 3);
        let mut sorted = images.clone();
        sorted.sort();
        assert_eq!(images, sorted);
    }

    #[test]
    fn collect_images_nonexistent_path() {
        let images = collect_images(&[PathBuf::from("/nonexistent/path")]);
        assert!(images.is_empty());
    }

    // ── naming ───────────────────────────────────────────────────────

    #[test]
    fn output_filename_format() {
        let t = NaiveDateTime::parse_from_str("2026:04:09 08:05:03", crate::exif::EXIF_DATETIME_FORMAT)
            .unwrap();
        assert_eq!(output_filename("IMG_", &t, 7), "IMG_20260409_080503_0007.jpg");
        assert_eq!(output_filename("", &t, 12345), "20260409_080503_12345.jpg");
    }

    #[test]
    fn bundle_name_sanitizes_token() {
        assert_eq!(bundle_name("alice"), "alice_product");
        assert_eq!(bundle_name("team/42 x"), "team_42_x_product");
        assert_eq!(bundle_name("  "), "batch_product");
    }

    // ── build_rewriter_chain ─────────────────────────────────────────

    #[test]
    fn build_rewriter_chain_none_enabled() {
        let mut config = Config::default();
        config.ai_services.gemini.enabled = false;
        config.ai_services.openai.enabled = false;
        assert!(build_rewriter_chain(&config).is_empty());
    }

    #[test]
    fn build_rewriter_chain_skips_empty_keys() {
        let config = Config::default(); // gemini enabled but key is empty
        assert!(build_rewriter_chain(&config).is_empty());
    }

    #[test]
    fn build_rewriter_chain_follows_order() {
        let mut config = Config::default();
        config.ai_services.gemini.api_key = "g-test".into();
        config.ai_services.openai.api_key = "sk-test".into();
        config.ai_services.openai.enabled = true;
        config.service_order = vec!["openai".into(), "gemini".into()];

        let services = build_rewriter_chain(&config);
        let names: Vec<&str> = services.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["OpenAI", "Gemini"]);
    }

    // ── process_images ───────────────────────────────────────────────

    #[test]
    fn bad_image_does_not_abort_batch() {
        let images = vec![
            png(16, 16, 60),
            InputImage { name: "broken.jpg".into(), bytes: b"not an image".to_vec() },
            png(16, 16, 200),
        ];
        let result = process_images(&request(images), &Config::default(), Some(1));

        assert_eq!(result.total(), 3);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 1);

        let broken = &result.outcomes[1];
        assert_eq!(broken.index, 2);
        assert!(broken.error.is_some());
        assert!(broken.filename.is_none());
        assert!(broken.bytes.is_empty());

        for ok in [&result.outcomes[0], &result.outcomes[2]] {
            assert!(ok.is_success());
            assert!(!ok.bytes.is_empty());
        }
    }

    #[test]
    fn filenames_are_indexed_and_chronological() {
        let images = (0..4).map(|i| png(8, 8, 40 + i * 50)).collect();
        let result = process_images(&request(images), &Config::default(), Some(2));

        let names: Vec<String> = result
            .outcomes
            .iter()
            .map(|o| o.filename.clone().unwrap())
            .collect();
        for (i, name) in names.iter().enumerate() {
            assert!(name.starts_with("IMG_"), "{name}");
            assert!(name.ends_with(&format!("_{:04}.jpg", i + 1)), "{name}");
            assert_eq!(name.len(), "IMG_20260101_000000_0001.jpg".len());
        }
        // Shots are at least two seconds apart, so timestamps strictly increase
        for pair in names.windows(2) {
            assert!(pair[0][4..19] < pair[1][4..19], "{pair:?}");
        }
    }

    #[test]
    fn seed_fixes_the_session() {
        let a = process_images(&request(vec![png(8, 8, 90)]), &Config::default(), Some(9));
        let b = process_images(&request(vec![png(8, 8, 90)]), &Config::default(), Some(9));
        assert_eq!(a.device_serial, b.device_serial);
        assert_eq!(a.lens_serial, b.lens_serial);
        assert_eq!(a.latitude, b.latitude);
        assert_eq!(a.region, "germany");
    }

    #[test]
    fn missing_region_uses_config_default() {
        let mut config = Config::default();
        config.session.default_region = "australia".into();
        let mut req = request(vec![png(8, 8, 90)]);
        req.region = None;
        let result = process_images(&req, &config, Some(3));
        assert_eq!(result.region, "australia");
        assert!(result.latitude < 0.0);
    }

    #[test]
    fn empty_batch_still_reports_session() {
        let result = process_images(&request(Vec::new()), &Config::default(), Some(4));
        assert_eq!(result.total(), 0);
        assert_eq!(result.failed(), 0);
        assert!(result.device_serial.starts_with("F2L"));
        assert_eq!(result.bundle_name, "tester_product");
    }

    // ── process_batch ────────────────────────────────────────────────

    #[tokio::test]
    async fn description_passes_through_without_rewriters() {
        let mut req = request(vec![png(8, 8, 120)]);
        req.description = Some("Linen tablecloth, 140 x 220 cm".into());
        let result = process_batch(req, &[], &Config::default(), Some(5)).await;
        assert_eq!(result.description.as_deref(), Some("Linen tablecloth, 140 x 220 cm"));
        assert_eq!(result.original_description, result.description);
        assert_eq!(result.succeeded(), 1);
    }
}
