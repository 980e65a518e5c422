use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::session::{DEFAULT_REGION, MAX_JITTER_RADIUS_M};

/// Top-level configuration for the exif-session library.
///
/// Controls the text rewriters, the batch session, the re-encode pass, and output naming.
///
/// # Loading
///
/// ```rust,no_run
/// use exif_session::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.session.default_region = "germany".into();
/// config.encoding.jpeg_quality = 92;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text rewriting service configurations (Gemini, OpenAI).
    pub ai_services: AiServices,
    /// Order in which rewriters are tried (failover chain).
    pub service_order: Vec<String>,
    pub session: SessionConfig,
    pub encoding: EncodingConfig,
    pub output: OutputConfig,
}

/// Configuration for all available text rewriting services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiServices {
    pub gemini: GeminiConfig,
    pub openai: OpenAiConfig,
}

/// Google Gemini service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub enabled: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            enabled: true,
        }
    }
}

/// OpenAI service configuration (GPT-4o-mini, GPT-4o, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub enabled: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            enabled: false,
        }
    }
}

/// Batch session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Region used when a request does not name one.
    pub default_region: String,
    /// Radius of the one-off location offset, in metres. Clamped to 500.
    pub jitter_radius_m: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_region: DEFAULT_REGION.to_string(),
            jitter_radius_m: 450.0,
        }
    }
}

/// Re-encode pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub jpeg_quality: u8,
    /// Gaussian sigma of the unsharp mask.
    pub sharpen_sigma: f32,
    pub sharpen_percent: f32,
    /// Per-channel difference below which a pixel is not sharpened.
    pub sharpen_threshold: u8,
    pub contrast_factor: f32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            sharpen_sigma: 0.6,
            sharpen_percent: 10.0,
            sharpen_threshold: 3,
            contrast_factor: 1.01,
        }
    }
}

/// Output naming and side files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Prepended to every output filename.
    pub filename_prefix: String,
    /// If `true`, the CLI also writes the unrewritten description as `original_text.txt`.
    pub write_original_text: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            filename_prefix: "IMG_".to_string(),
            write_original_text: true,
        }
    }
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.sanitize();
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Fill empty API keys from `GEMINI_API_KEY` / `OPENAI_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |key: &mut String, var: &str| {
            if key.is_empty() {
                if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                    log::debug!("Using {var} from environment");
                    *key = value.trim().to_string();
                }
            }
        };
        fill(&mut self.ai_services.gemini.api_key, "GEMINI_API_KEY");
        fill(&mut self.ai_services.openai.api_key, "OPENAI_API_KEY");
    }

    /// Get the ordered list of enabled text rewriters.
    pub fn enabled_services(&self) -> Vec<String> {
        self.service_order
            .iter()
            .filter(|name| match name.as_str() {
                "gemini" => self.ai_services.gemini.enabled,
                "openai" => self.ai_services.openai.enabled,
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Pull out-of-range values back into range.
    fn sanitize(&mut self) {
        if !(0.0..=MAX_JITTER_RADIUS_M).contains(&self.session.jitter_radius_m) {
            log::warn!(
                "jitter_radius_m {} out of range, clamping to [0, {MAX_JITTER_RADIUS_M}]",
                self.session.jitter_radius_m
            );
            self.session.jitter_radius_m =
                self.session.jitter_radius_m.clamp(0.0, MAX_JITTER_RADIUS_M);
        }
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            log::warn!(
                "jpeg_quality {} out of range, clamping to [1, 100]",
                self.encoding.jpeg_quality
            );
            self.encoding.jpeg_quality = self.encoding.jpeg_quality.clamp(1, 100);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_services: AiServices::default(),
            service_order: vec!["gemini".to_string(), "openai".to_string()],
            session: SessionConfig::default(),
            encoding: EncodingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}
