//! Configuration types for the Nostalgia server.
//!
//! Settings come from an optional `nostalgia.json` (camelCase keys, every
//! field defaulted) plus the Replicate token from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nostalgia_replicate::{DEFAULT_API_BASE, EXPRESSION_EDITOR_VERSION, VIDEO_MODEL};
use nostalgia_warp::SmileWarpParams;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "nostalgia.json";

/// Environment variable holding the Replicate token.
pub const API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

/// Default remote attempts before falling back.
const fn default_max_retries() -> u32 {
    3
}

/// Default pause between remote attempts.
const fn default_retry_delay_secs() -> u64 {
    4
}

const fn default_jpeg_quality() -> u8 {
    95
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_expression_version() -> String {
    EXPRESSION_EDITOR_VERSION.to_string()
}

fn default_video_model() -> String {
    VIDEO_MODEL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    120
}

const fn default_download_timeout_secs() -> u64 {
    180
}

/// Smallest accepted warp radius, in pixels.
const MIN_WARP_RADIUS: f32 = 0.5;

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_detector_timeout_secs() -> u64 {
    10
}

/// Main configuration for the Nostalgia server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Where produced images are written and served from.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Where uploads are staged while a request is in flight.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Smile pipeline settings.
    #[serde(default)]
    pub smile: SmileConfig,

    /// Replicate API settings.
    #[serde(default)]
    pub replicate: ReplicateConfig,

    /// Landmark detector settings.
    #[serde(default)]
    pub landmarks: LandmarkConfig,

    /// Replicate token; read from the environment, never from the file.
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            results_dir: default_results_dir(),
            temp_dir: default_temp_dir(),
            smile: SmileConfig::default(),
            replicate: ReplicateConfig::default(),
            landmarks: LandmarkConfig::default(),
            api_token: None,
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `nostalgia.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ServerError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `nostalgia.json` from a directory, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigParseError` for unreadable files or invalid
    /// JSON and `ServerError::ConfigValidationError` for invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ServerError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ServerError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the Replicate token from `REPLICATE_API_TOKEN`.
    ///
    /// Blank values count as unset.
    #[must_use]
    pub fn with_api_token_from_env(self) -> Self {
        let token = std::env::var(API_TOKEN_ENV).ok();
        self.with_api_token(token)
    }

    /// Sets the Replicate token explicitly.
    #[must_use]
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Returns whether a Replicate token is configured.
    #[must_use]
    pub const fn has_api_token(&self) -> bool {
        self.api_token.is_some()
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.smile.max_retries == 0 {
            return Err(ServerError::config_validation(
                "smile.maxRetries must be greater than 0",
                "Set smile.maxRetries to at least 1 in your nostalgia.json",
            ));
        }

        if !(1..=100).contains(&self.smile.jpeg_quality) {
            return Err(ServerError::config_validation(
                format!("smile.jpegQuality must be 1-100, got {}", self.smile.jpeg_quality),
                "Set smile.jpegQuality to a value between 1 and 100 (95 is the default)",
            ));
        }

        let warp = &self.smile.warp;
        if !(warp.radius.is_finite() && warp.radius >= MIN_WARP_RADIUS) {
            return Err(ServerError::config_validation(
                format!("smile.warp.radius must be at least {MIN_WARP_RADIUS} pixels"),
                "Set smile.warp.radius to a pixel radius such as 18",
            ));
        }
        if !(warp.lift_factor.is_finite() && warp.spread_factor.is_finite()) {
            return Err(ServerError::config_validation(
                "smile.warp factors must be finite",
                "Use plain numbers for smile.warp.liftFactor and smile.warp.spreadFactor",
            ));
        }

        if self.replicate.api_base.trim().is_empty() {
            return Err(ServerError::config_validation(
                "replicate.apiBase must not be empty",
                "Remove replicate.apiBase from nostalgia.json to use the public API",
            ));
        }

        if self.replicate.request_timeout_secs == 0 || self.replicate.download_timeout_secs == 0 {
            return Err(ServerError::config_validation(
                "replicate timeouts must be greater than 0",
                "Set replicate.requestTimeoutSecs and replicate.downloadTimeoutSecs to at least 1",
            ));
        }

        if self.replicate.poll_interval_ms == 0 {
            return Err(ServerError::config_validation(
                "replicate.pollIntervalMs must be greater than 0",
                "Set replicate.pollIntervalMs to at least 1 (default: 1000)",
            ));
        }

        if self.landmarks.detector == DetectorKind::Sidecar
            && self
                .landmarks
                .endpoint
                .as_deref()
                .is_none_or(|e| e.trim().is_empty())
        {
            return Err(ServerError::config_validation(
                "landmarks.endpoint is required for the sidecar detector",
                "Set landmarks.endpoint to the face-mesh service URL, or use \"detector\": \"disabled\"",
            ));
        }

        if self.results_dir.as_os_str().is_empty() || self.temp_dir.as_os_str().is_empty() {
            return Err(ServerError::config_validation(
                "resultsDir and tempDir must not be empty",
                "Provide directory paths in your nostalgia.json (relative paths are fine)",
            ));
        }

        Ok(())
    }
}

/// Settings for the smile pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmileConfig {
    /// Remote attempts before falling back to the local warp.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between remote attempts, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Retry authentication, quota and invalid-request failures too.
    #[serde(default)]
    pub retry_all_errors: bool,

    /// JPEG quality for locally produced images.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Geometric warp constants.
    #[serde(default)]
    pub warp: SmileWarpParams,
}

impl Default for SmileConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            retry_all_errors: false,
            jpeg_quality: default_jpeg_quality(),
            warp: SmileWarpParams::default(),
        }
    }
}

impl SmileConfig {
    /// The pause between remote attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Settings for the Replicate API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicateConfig {
    /// API root.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Pinned expression editor version.
    #[serde(default = "default_expression_version")]
    pub expression_model_version: String,

    /// `owner/name` of the image-to-video model.
    #[serde(default = "default_video_model")]
    pub video_model: String,

    /// Network timeout for API requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for downloading generated videos, in seconds.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Pause between status checks of a running prediction, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            expression_model_version: default_expression_version(),
            video_model: default_video_model(),
            request_timeout_secs: default_request_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Which landmark detector to run in the fallback tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectorKind {
    /// Never finds a face; the fallback always passes the image through.
    #[default]
    Disabled,
    /// Calls a face-mesh HTTP sidecar.
    Sidecar,
}

impl DetectorKind {
    /// Parses a string into a `DetectorKind`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disabled" => Some(Self::Disabled),
            "sidecar" => Some(Self::Sidecar),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for DetectorKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid landmark detector '{s}': expected one of 'disabled', 'sidecar'"
            ))
        })
    }
}

impl Serialize for DetectorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Disabled => "disabled",
            Self::Sidecar => "sidecar",
        };
        serializer.serialize_str(s)
    }
}

/// Landmark detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkConfig {
    /// Detector implementation.
    #[serde(default)]
    pub detector: DetectorKind,

    /// Sidecar URL receiving the image bytes.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Sidecar request timeout, in seconds.
    #[serde(default = "default_detector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            endpoint: None,
            timeout_secs: default_detector_timeout_secs(),
        }
    }
}
