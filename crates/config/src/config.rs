//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is outside its accepted range
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Codecs the transcoder knows how to produce.
///
/// The set is closed: a codec outside this list is rejected while the
/// configuration is parsed, never at encode time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetCodec {
    #[default]
    Hevc,
    H264,
}

impl TargetCodec {
    /// Codec name as reported by ffprobe's `codec_name`.
    pub fn name(&self) -> &'static str {
        match self {
            TargetCodec::Hevc => "hevc",
            TargetCodec::H264 => "h264",
        }
    }

    /// Software encoder library passed to `-c:v`.
    pub fn encoder_library(&self) -> &'static str {
        match self {
            TargetCodec::Hevc => "libx265",
            TargetCodec::H264 => "libx264",
        }
    }

    /// Default destination marker, e.g. `.hevc`.
    pub fn default_marker(&self) -> String {
        format!(".{}", self.name())
    }
}

impl std::fmt::Display for TargetCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetCodec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hevc" | "h265" => Ok(TargetCodec::Hevc),
            "h264" | "avc" => Ok(TargetCodec::H264),
            other => Err(ConfigError::Invalid {
                field: "encode.target_codec",
                reason: format!("unsupported codec '{}'", other),
            }),
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Probing binary (name on PATH or absolute path)
    #[serde(default = "default_probe_binary")]
    pub probe_binary: String,
    /// Encoding binary (name on PATH or absolute path)
    #[serde(default = "default_encode_binary")]
    pub encode_binary: String,
}

fn default_probe_binary() -> String {
    "ffprobe".to_string()
}

fn default_encode_binary() -> String {
    "ffmpeg".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            probe_binary: default_probe_binary(),
            encode_binary: default_encode_binary(),
        }
    }
}

/// Encoding settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    #[serde(default)]
    pub target_codec: TargetCodec,
    /// Constant rate factor, lower is higher quality (default 34)
    #[serde(default = "default_crf")]
    pub crf: u8,
    /// Marker inserted before the destination extension (derived from codec if unset)
    #[serde(default)]
    pub marker: Option<String>,
    /// Rename destinations to an `.mp4` container
    #[serde(default)]
    pub force_mp4_container: bool,
}

fn default_crf() -> u8 {
    34
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            target_codec: TargetCodec::default(),
            crf: default_crf(),
            marker: None,
            force_mp4_container: false,
        }
    }
}

impl EncodeConfig {
    /// Marker to insert before the destination extension.
    pub fn effective_marker(&self) -> String {
        self.marker
            .clone()
            .unwrap_or_else(|| self.target_codec.default_marker())
    }
}

/// Directory scanning settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Video container suffixes without the dot (case-insensitive)
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "m4a", "mkv", "flv", "avi", "mov", "m4v", "ts", "m2ts", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            video_extensions: default_video_extensions(),
        }
    }
}

/// Progress reporting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressConfig {
    /// Seconds subtracted from the source duration to get the progress total
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: f64,
    /// Minimum milliseconds between two rendered updates (0 = render every update)
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,
}

fn default_safety_margin_secs() -> f64 {
    1.0
}

fn default_render_interval_ms() -> u64 {
    200
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: default_safety_margin_secs(),
            render_interval_ms: default_render_interval_ms(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
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
    /// - HEVCIFY_PROBE_BINARY -> tools.probe_binary
    /// - HEVCIFY_ENCODE_BINARY -> tools.encode_binary
    /// - HEVCIFY_CRF -> encode.crf
    /// - HEVCIFY_TARGET_CODEC -> encode.target_codec
    /// - HEVCIFY_FORCE_MP4 -> encode.force_mp4_container
    ///
    /// Values that fail to parse leave the existing setting in place, except
    /// for an unknown codec name, which is an error.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var("HEVCIFY_PROBE_BINARY") {
            if !val.trim().is_empty() {
                self.tools.probe_binary = val;
            }
        }

        if let Ok(val) = env::var("HEVCIFY_ENCODE_BINARY") {
            if !val.trim().is_empty() {
                self.tools.encode_binary = val;
            }
        }

        if let Ok(val) = env::var("HEVCIFY_CRF") {
            if let Ok(crf) = val.trim().parse::<u8>() {
                self.encode.crf = crf;
            }
        }

        if let Ok(val) = env::var("HEVCIFY_TARGET_CODEC") {
            self.encode.target_codec = val.parse()?;
        }

        if let Ok(val) = env::var("HEVCIFY_FORCE_MP4") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.encode.force_mp4_container = true,
                "false" | "0" | "no" => self.encode.force_mp4_container = false,
                _ => {}
            }
        }

        Ok(())
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encode.crf > 51 {
            return Err(ConfigError::Invalid {
                field: "encode.crf",
                reason: format!("{} is outside 0..=51", self.encode.crf),
            });
        }
        if self.scan.video_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "scan.video_extensions",
                reason: "at least one extension is required".to_string(),
            });
        }
        if !self.progress.safety_margin_secs.is_finite() || self.progress.safety_margin_secs < 0.0
        {
            return Err(ConfigError::Invalid {
                field: "progress.safety_margin_secs",
                reason: format!("{} must be a non-negative number", self.progress.safety_margin_secs),
            });
        }
        if let Some(marker) = &self.encode.marker {
            if marker.is_empty() || marker.contains(['/', '\\']) {
                return Err(ConfigError::Invalid {
                    field: "encode.marker",
                    reason: format!("'{}' is not a usable file name fragment", marker),
                });
            }
        }
        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}
