//! # exif-session
//!
//! Re-encode a batch of images so that every one of them carries camera metadata consistent
//! with a single phone and a single shooting location: same body and lens serials, the same
//! GPS spot, exposure values derived from each image's own brightness, and capture times a
//! few seconds apart.
//!
//! ## Quick Start
//!
//! The pipeline module runs the whole batch: session, optional description rewrite, then
//! normalize, derive exposure, build the record and embed it for each image.
//!
//! ```rust,no_run
//! use exif_session::config::Config;
//! use exif_session::pipeline::{BatchRequest, InputImage, build_rewriter_chain, collect_images, process_batch};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let rewriters = build_rewriter_chain(&config);
//!
//!     let mut images = Vec::new();
//!     for path in collect_images(&[PathBuf::from("./product")]) {
//!         images.push(InputImage::from_path(&path)?);
//!     }
//!
//!     let request = BatchRequest {
//!         images,
//!         region: Some("france".into()),
//!         batch_token: "alice".into(),
//!         description: None,
//!     };
//!     let result = process_batch(request, &rewriters, &config, None).await;
//!
//!     for outcome in &result.outcomes {
//!         match (&outcome.filename, &outcome.error) {
//!             (Some(name), None) => std::fs::write(name, &outcome.bytes)?,
//!             (_, Some(err)) => eprintln!("{}: {err}", outcome.source_name),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! Each stage can be driven on its own:
//!
//! ```rust,no_run
//! use exif_session::exif::{Embedder, build_record, read_exif_bytes};
//! use exif_session::normalize::Normalizer;
//! use exif_session::photometric::derive_parameters;
//! use exif_session::session::SessionSlot;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut rng = rand::rng();
//!     let mut slot = SessionSlot::new(450.0);
//!     let session = slot.get_or_create("uk", &mut rng).clone();
//!
//!     let raster = Normalizer::default().normalize(&std::fs::read("mug.png")?)?;
//!     let photo = derive_parameters(&raster, session.device.aperture, &mut rng);
//!     let now = chrono::Local::now().naive_local();
//!     let record = build_record(&session, &photo, raster.dimensions(), now, &mut rng);
//!
//!     let report = Embedder::new(95).encode(&raster, &record)?;
//!     println!("Embedded {:?} tier, model {:?}", report.tier, read_exif_bytes(&report.bytes)?.model);
//!     Ok(())
//! }
//! ```
//!
//! ## Metadata Tiers
//!
//! | Tier | Contents |
//! |------|----------|
//! | `full` | Everything, plus lens identifiers, serials, UTC offsets and sub-second times |
//! | `clean` | Image, capture and GPS sections |
//! | `minimal` | Make, model, software, timestamps, exposure, aperture, ISO, focal length |
//! | `basic` | Make, model, capture timestamp |
//!
//! The encoder tries `clean`, upgrades to `full` when it can, and steps down the ladder
//! on any failure. If nothing serializes, the image is still returned without EXIF.
//!
//! ## Modules
//!
//! - [`ai`]: Description rewriting services (Gemini, OpenAI) with failover
//! - [`config`]: Configuration types and loading/saving
//! - [`exif`]: Record building, tiered embedding and read-back
//! - [`normalize`]: Decode to RGB and apply the light sharpen/contrast pass
//! - [`photometric`]: Exposure parameters from image brightness
//! - [`pipeline`]: Batch processing, image collection and output naming
//! - [`session`]: Batch-scoped device and location identity

pub mod ai;
pub mod config;
pub mod exif;
pub mod normalize;
pub mod photometric;
pub mod pipeline;
pub mod session;
