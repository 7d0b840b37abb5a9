//! Signer configuration
//!
//! Sources are applied in order, later overriding earlier: built-in
//! defaults, a JSON file, then `PDF_SIGNER_*` environment variables.

use crate::annotation::{Color, FontDescriptor, Size, TextStyle};
use crate::capture::CaptureSettings;
use pdf_signer_cache::RenderCacheConfig;
use pdf_signer_scheduler::{LayoutMetrics, SchedulerConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Zoom range and step
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub initial_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub zoom_step: f32,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self { initial_scale: 1.5, min_scale: 0.5, max_scale: 3.0, zoom_step: 0.25 }
    }
}

impl ViewerSettings {
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// How long a render waits for a busy page surface
    pub surface_wait_ms: u64,
    /// Pages within this many pixels of the viewport count as visible
    pub visibility_margin: f32,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_memory_mb: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            surface_wait_ms: 50,
            visibility_margin: 100.0,
            cache_enabled: true,
            cache_ttl_secs: 300,
            cache_memory_mb: 256,
        }
    }
}

impl RenderSettings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            surface_wait: Duration::from_millis(self.surface_wait_ms),
            use_cache: self.cache_enabled,
        }
    }

    pub fn cache_config(&self) -> RenderCacheConfig {
        RenderCacheConfig::new(self.cache_memory_mb, Duration::from_secs(self.cache_ttl_secs))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub container_width: f32,
    pub padding: f32,
    pub page_gap: f32,
    pub max_page_width: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        let metrics = LayoutMetrics::default();
        Self {
            container_width: metrics.container_width,
            padding: metrics.padding,
            page_gap: metrics.page_gap,
            max_page_width: metrics.max_page_width,
        }
    }
}

impl LayoutSettings {
    pub fn metrics(&self) -> LayoutMetrics {
        LayoutMetrics {
            container_width: self.container_width,
            padding: self.padding,
            page_gap: self.page_gap,
            max_page_width: self.max_page_width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub padding: f32,
    pub min_size: f32,
    pub pen_width: f32,
    pub pen_color: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let settings = CaptureSettings::default();
        Self {
            padding: settings.padding,
            min_size: settings.min_size,
            pen_width: settings.pen_width,
            pen_color: settings.pen_color.to_hex(),
        }
    }
}

impl CaptureConfig {
    pub fn settings(&self) -> Result<CaptureSettings, ConfigError> {
        let pen_color = Color::from_hex(&self.pen_color)
            .ok_or_else(|| ConfigError::InvalidValue(format!("capture.pen_color '{}'", self.pen_color)))?;
        Ok(CaptureSettings {
            padding: self.padding,
            min_size: self.min_size,
            pen_width: self.pen_width,
            pen_color,
        })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextSettings {
    pub width: f32,
    pub height: f32,
    pub font: String,
    pub color: String,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self { width: 120.0, height: 32.0, font: "16px Arial".to_string(), color: "#222".to_string() }
    }
}

impl TextSettings {
    pub fn label_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn style(&self) -> Result<TextStyle, ConfigError> {
        let font = FontDescriptor::parse(&self.font)
            .ok_or_else(|| ConfigError::InvalidValue(format!("text.font '{}'", self.font)))?;
        let color = Color::from_hex(&self.color)
            .ok_or_else(|| ConfigError::InvalidValue(format!("text.color '{}'", self.color)))?;
        Ok(TextStyle { font, color })
    }
}

/// Complete signer configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub viewer: ViewerSettings,
    pub render: RenderSettings,
    pub layout: LayoutSettings,
    pub capture: CaptureConfig,
    pub text: TextSettings,
    /// Largest accepted input file in bytes
    pub max_input_bytes: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            viewer: ViewerSettings::default(),
            render: RenderSettings::default(),
            layout: LayoutSettings::default(),
            capture: CaptureConfig::default(),
            text: TextSettings::default(),
            max_input_bytes: 50 * 1024 * 1024, // 50 MiB
        }
    }
}

impl SignerConfig {
    /// `<config dir>/pdf-signer/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pdf-signer").join("config.json"))
    }

    /// Load defaults, then the default config file if it exists, then the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables.
    ///
    /// Environment variables:
    /// - `PDF_SIGNER_INITIAL_SCALE`, `PDF_SIGNER_MIN_SCALE`, `PDF_SIGNER_MAX_SCALE`
    /// - `PDF_SIGNER_ZOOM_STEP`
    /// - `PDF_SIGNER_SURFACE_WAIT_MS`
    /// - `PDF_SIGNER_CACHE_MB`: render cache size in MB (default: 256)
    /// - `PDF_SIGNER_CACHE_TTL_SECS`
    /// - `PDF_SIGNER_MAX_INPUT_MB`: largest accepted input (default: 50)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_value("PDF_SIGNER_INITIAL_SCALE")? {
            self.viewer.initial_scale = value;
        }
        if let Some(value) = env_value("PDF_SIGNER_MIN_SCALE")? {
            self.viewer.min_scale = value;
        }
        if let Some(value) = env_value("PDF_SIGNER_MAX_SCALE")? {
            self.viewer.max_scale = value;
        }
        if let Some(value) = env_value("PDF_SIGNER_ZOOM_STEP")? {
            self.viewer.zoom_step = value;
        }
        if let Some(value) = env_value("PDF_SIGNER_SURFACE_WAIT_MS")? {
            self.render.surface_wait_ms = value;
        }
        if let Some(value) = env_value("PDF_SIGNER_CACHE_MB")? {
            self.render.cache_memory_mb = value;
        }
        if let Some(value) = env_value("PDF_SIGNER_CACHE_TTL_SECS")? {
            self.render.cache_ttl_secs = value;
        }
        if let Some(value) = env_value::<u64>("PDF_SIGNER_MAX_INPUT_MB")? {
            self.max_input_bytes = value.checked_mul(1024 * 1024).ok_or_else(|| {
                ConfigError::InvalidValue(format!("PDF_SIGNER_MAX_INPUT_MB={value} is too large"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let viewer = &self.viewer;
        let positive = |name: &str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue(format!("{name} must be positive, got {value}")))
            }
        };

        positive("viewer.min_scale", viewer.min_scale)?;
        positive("viewer.max_scale", viewer.max_scale)?;
        positive("viewer.zoom_step", viewer.zoom_step)?;
        if viewer.min_scale > viewer.max_scale {
            return Err(ConfigError::InvalidValue(format!(
                "viewer.min_scale {} exceeds viewer.max_scale {}",
                viewer.min_scale, viewer.max_scale
            )));
        }
        if !(viewer.min_scale..=viewer.max_scale).contains(&viewer.initial_scale) {
            return Err(ConfigError::InvalidValue(format!(
                "viewer.initial_scale {} is outside {}..={}",
                viewer.initial_scale, viewer.min_scale, viewer.max_scale
            )));
        }

        let non_negative = |name: &str, value: f32| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue(format!("{name} must not be negative, got {value}")))
            }
        };

        positive("layout.container_width", self.layout.container_width)?;
        non_negative("layout.padding", self.layout.padding)?;
        non_negative("layout.page_gap", self.layout.page_gap)?;
        non_negative("capture.padding", self.capture.padding)?;
        positive("layout.max_page_width", self.layout.max_page_width)?;
        positive("capture.min_size", self.capture.min_size)?;
        positive("capture.pen_width", self.capture.pen_width)?;
        positive("text.width", self.text.width)?;
        positive("text.height", self.text.height)?;
        if self.max_input_bytes == 0 {
            return Err(ConfigError::InvalidValue("max_input_bytes must be positive".to_string()));
        }

        self.capture.settings()?;
        self.text.style()?;
        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{name}='{raw}'"))),
        Err(_) => Ok(None),
    }
}
