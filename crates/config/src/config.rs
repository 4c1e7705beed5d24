//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest accepted `watermark.font_size`, in pixels
pub const MAX_FONT_SIZE: f32 = 1024.0;

/// Largest accepted `watermark.padding_tiles`
pub const MAX_PADDING_TILES: u32 = 64;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value parsed but is outside its allowed range
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// An RGB color parsed from `#RGB` or `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
}

/// Parse a hex color string (`#RGB` or `#RRGGBB`, case-insensitive).
pub fn parse_hex_color(hex: &str) -> Option<Rgb> {
    let digits = hex.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match digits.len() {
        // #RGB doubles each nibble: F -> FF
        3 => Some(Rgb {
            r: channel(&digits[0..1])? * 17,
            g: channel(&digits[1..2])? * 17,
            b: channel(&digits[2..3])? * 17,
        }),
        6 => Some(Rgb {
            r: channel(&digits[0..2])?,
            g: channel(&digits[2..4])?,
            b: channel(&digits[4..6])?,
        }),
        _ => None,
    }
}

/// Watermark appearance and tile geometry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatermarkConfig {
    /// Text stamped into every tile
    #[serde(default = "default_text")]
    pub text: String,
    /// Distance between tile anchors in pixels (default 200)
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    /// Horizontal offset of the first tile anchor
    #[serde(default = "default_offset_x")]
    pub offset_x: u32,
    /// Vertical offset of the first tile anchor
    #[serde(default = "default_offset_y")]
    pub offset_y: u32,
    /// Extra rows/columns beyond the visible edge so rotated corners are covered
    #[serde(default = "default_padding_tiles")]
    pub padding_tiles: u32,
    /// Rotation about each tile anchor, SVG convention (negative = counter-clockwise)
    #[serde(default = "default_rotation_degrees")]
    pub rotation_degrees: f32,
    /// Tile opacity (0.0-1.0, default 0.15)
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Font size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Fill color as `#RGB` or `#RRGGBB`
    #[serde(default = "default_color")]
    pub color: String,
    /// Quality used when re-encoding JPEG sources (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_text() -> String {
    "NQJACK".to_string()
}

fn default_tile_size() -> u32 {
    200
}

fn default_offset_x() -> u32 {
    20
}

fn default_offset_y() -> u32 {
    50
}

fn default_padding_tiles() -> u32 {
    2
}

fn default_rotation_degrees() -> f32 {
    -45.0
}

fn default_opacity() -> f32 {
    0.15
}

fn default_font_size() -> f32 {
    28.0
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_jpeg_quality() -> u8 {
    80
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: default_text(),
            tile_size: default_tile_size(),
            offset_x: default_offset_x(),
            offset_y: default_offset_y(),
            padding_tiles: default_padding_tiles(),
            rotation_degrees: default_rotation_degrees(),
            opacity: default_opacity(),
            font_size: default_font_size(),
            color: default_color(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Filesystem layout of the public site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Root directory served publicly
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// URL-style prefix of the uploads area, relative to `public_dir`
    #[serde(default = "default_uploads_prefix")]
    pub uploads_prefix: String,
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_uploads_prefix() -> String {
    "/uploads/".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            public_dir: default_public_dir(),
            uploads_prefix: default_uploads_prefix(),
        }
    }
}

impl PathsConfig {
    /// Directory scanned by `batch` and observed by `watch`.
    ///
    /// `public` + `/uploads/` -> `public/uploads`
    pub fn uploads_dir(&self) -> PathBuf {
        let relative = self.uploads_prefix.trim_matches('/');
        if relative.is_empty() {
            self.public_dir.clone()
        } else {
            self.public_dir.join(relative)
        }
    }
}

/// Watch daemon timing and dedup bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    /// Quiet period after the last event before a file is processed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long a processed path is remembered
    #[serde(default = "default_processed_ttl_secs")]
    pub processed_ttl_secs: u64,
    /// Maximum number of remembered paths
    #[serde(default = "default_processed_capacity")]
    pub processed_capacity: usize,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_processed_ttl_secs() -> u64 {
    3600
}

fn default_processed_capacity() -> usize {
    10_000
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            processed_ttl_secs: default_processed_ttl_secs(),
            processed_capacity: default_processed_capacity(),
        }
    }
}

/// HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address the watermark endpoint binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - TILEMARK_TEXT -> watermark.text
    /// - TILEMARK_OPACITY -> watermark.opacity
    /// - TILEMARK_TILE_SIZE -> watermark.tile_size
    /// - TILEMARK_PUBLIC_DIR -> paths.public_dir
    /// - TILEMARK_DEBOUNCE_MS -> watch.debounce_ms
    /// - TILEMARK_BIND -> server.bind
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TILEMARK_TEXT") {
            if !val.is_empty() {
                self.watermark.text = val;
            }
        }

        if let Ok(val) = env::var("TILEMARK_OPACITY") {
            if let Ok(opacity) = val.parse::<f32>() {
                self.watermark.opacity = opacity;
            }
        }

        if let Ok(val) = env::var("TILEMARK_TILE_SIZE") {
            if let Ok(size) = val.parse::<u32>() {
                self.watermark.tile_size = size;
            }
        }

        if let Ok(val) = env::var("TILEMARK_PUBLIC_DIR") {
            if !val.is_empty() {
                self.paths.public_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("TILEMARK_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watch.debounce_ms = ms;
            }
        }

        if let Ok(val) = env::var("TILEMARK_BIND") {
            if !val.is_empty() {
                self.server.bind = val;
            }
        }
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let wm = &self.watermark;
        if wm.text.trim().is_empty() {
            return Err(ConfigError::invalid("watermark.text", "must not be empty"));
        }
        if wm.tile_size == 0 {
            return Err(ConfigError::invalid("watermark.tile_size", "must be positive"));
        }
        if !(0.0..=1.0).contains(&wm.opacity) {
            return Err(ConfigError::invalid(
                "watermark.opacity",
                format!("{} is outside 0.0-1.0", wm.opacity),
            ));
        }
        if !wm.font_size.is_finite() || wm.font_size <= 0.0 || wm.font_size > MAX_FONT_SIZE {
            return Err(ConfigError::invalid(
                "watermark.font_size",
                format!("{} is outside (0, {}]", wm.font_size, MAX_FONT_SIZE),
            ));
        }
        if wm.padding_tiles > MAX_PADDING_TILES {
            return Err(ConfigError::invalid(
                "watermark.padding_tiles",
                format!("{} exceeds {}", wm.padding_tiles, MAX_PADDING_TILES),
            ));
        }
        if !(1..=100).contains(&wm.jpeg_quality) {
            return Err(ConfigError::invalid(
                "watermark.jpeg_quality",
                format!("{} is outside 1-100", wm.jpeg_quality),
            ));
        }
        if parse_hex_color(&wm.color).is_none() {
            return Err(ConfigError::invalid(
                "watermark.color",
                format!("'{}' is not #RGB or #RRGGBB", wm.color),
            ));
        }

        let prefix = &self.paths.uploads_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(ConfigError::invalid(
                "paths.uploads_prefix",
                format!("'{}' must start and end with '/'", prefix),
            ));
        }

        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::invalid("watch.debounce_ms", "must be positive"));
        }
        if self.watch.processed_capacity == 0 {
            return Err(ConfigError::invalid(
                "watch.processed_capacity",
                "must be positive",
            ));
        }

        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
