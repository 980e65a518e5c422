use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use exif_session::{config, exif, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "exif-session-cli",
    version,
    about = "Re-encode a batch of product photos as one consistent phone shooting session"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Session region (usa, germany, canada, australia, france, uk); unknown keys fall back to usa
    #[arg(short, long)]
    region: Option<String>,

    /// Batch token, used to name the output directory
    #[arg(short, long, default_value = "batch")]
    token: String,

    /// Output directory (default: ./<token>_product)
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Text file with the product description to rewrite
    #[arg(short, long, value_name = "FILE")]
    description: Option<PathBuf>,

    /// Seed for a reproducible session
    #[arg(long)]
    seed: Option<u64>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Display the EXIF metadata of the given images and exit
    #[arg(long = "show-exif")]
    show_exif: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    if cli.show_exif {
        for image_path in &images {
            print_full_exif(image_path)?;
        }
        return Ok(());
    }

    let mut config = config::Config::load(cli.config.as_deref())?;
    config.apply_env();

    let description = match cli.description.as_deref() {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read description from {}", path.display()))?,
        ),
        None => None,
    };

    let mut inputs = Vec::with_capacity(images.len());
    for path in &images {
        inputs.push(pipeline::InputImage::from_path(path)?);
    }
    log::info!("Found {} image(s) to process", inputs.len());

    let rewriters = pipeline::build_rewriter_chain(&config);
    if description.is_some() {
        if rewriters.is_empty() {
            log::warn!("No text rewriter configured, the description is copied unchanged");
        } else {
            log::info!("Rewriter chain: {}", config.enabled_services().join(" -> "));
        }
    }

    let request = pipeline::BatchRequest {
        images: inputs,
        region: cli.region.clone(),
        batch_token: cli.token.clone(),
        description,
    };
    let result = pipeline::process_batch(request, &rewriters, &config, cli.seed).await;

    let out_dir = cli
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&result.bundle_name));
    write_outputs(&out_dir, &result, &config)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_session(&result, &out_dir);
    }

    log::info!(
        "Done: {} succeeded, {} failed out of {} images",
        result.succeeded(),
        result.failed(),
        result.total()
    );

    Ok(())
}

/// Write encoded images and description files into `out_dir`.
fn write_outputs(out_dir: &Path, result: &pipeline::BatchResult, config: &config::Config) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for outcome in &result.outcomes {
        let Some(ref filename) = outcome.filename else {
            continue;
        };
        let path = out_dir.join(filename);
        std::fs::write(&path, &outcome.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
    }

    if let Some(ref text) = result.description {
        std::fs::write(out_dir.join("description.txt"), text)
            .context("Failed to write description.txt")?;
    }
    if config.output.write_original_text {
        if let Some(ref text) = result.original_description {
            std::fs::write(out_dir.join("original_text.txt"), text)
                .context("Failed to write original_text.txt")?;
        }
    }

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print the session identity and a per-image table.
fn print_session(result: &pipeline::BatchResult, out_dir: &Path) {
    println!();
    println!("{BOLD}Session{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    print_row("Device", &result.device_model);
    print_row("BodySerialNumber", &result.device_serial);
    print_row("LensSerialNumber", &result.lens_serial);
    print_row("Location", &format!("{}, {}", result.city, result.region));
    print_row(
        "Coordinates",
        &format!("{:.6}, {:.6}", result.latitude, result.longitude),
    );
    if let Some(ref text) = result.description {
        print_row("Description", text);
    }
    println!();

    println!("{BOLD}Images{RESET} {DIM}({}){RESET}", out_dir.display());
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    for outcome in &result.outcomes {
        match (&outcome.filename, &outcome.error) {
            (Some(filename), None) => {
                let tier = outcome.tier.map(|t| t.name()).unwrap_or("none");
                let check = if outcome.verified { "verified" } else { "unverified" };
                println!(
                    "  {GREEN}{:<22}{RESET} : {filename} {DIM}[{tier}, {check}]{RESET}",
                    outcome.source_name
                );
            }
            (_, Some(err)) => {
                println!("  {RED}{:<22}{RESET} : {err}", outcome.source_name);
            }
            (None, None) => {}
        }
    }
    println!();
}

/// Print EXIF metadata for a file, organized by section.
fn print_full_exif(path: &Path) -> Result<()> {
    let data = exif::read_exif(path)?;

    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if data.is_empty() {
        println!("  {DIM}(no EXIF metadata found){RESET}");
        println!();
        return Ok(());
    }

    let camera_fields: Vec<(&str, Option<&str>)> = vec![
        ("Make", data.make.as_deref()),
        ("Model", data.model.as_deref()),
        ("LensModel", data.lens_model.as_deref()),
        ("Software", data.software.as_deref()),
    ];
    print_section("Camera / Device", &camera_fields);

    let capture_fields: Vec<(&str, Option<&str>)> = vec![
        ("DateTimeOriginal", data.date_time_original.as_deref()),
        ("ISO", data.iso.as_deref()),
    ];
    print_section("Capture Settings", &capture_fields);

    if data.has_gps {
        println!("  {BOLD}GPS{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        if let Some(lat) = data.gps_latitude {
            print_row("GPSLatitude", &format!("{lat:.6}"));
        }
        if let Some(lon) = data.gps_longitude {
            print_row("GPSLongitude", &format!("{lon:.6}"));
        }
        println!();
    }

    Ok(())
}

fn print_section(title: &str, fields: &[(&str, Option<&str>)]) {
    if fields.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    println!("  {BOLD}{title}{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    for (tag, val) in fields {
        if let Some(v) = val {
            print_row(tag, v);
        }
    }
    println!();
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
