//! Error types for the Nostalgia server.
//!
//! Covers configuration loading, upload validation, image handling and
//! remote calls that surface to HTTP clients. The smile pipeline itself never
//! returns these: it degrades instead.

use std::path::PathBuf;

use nostalgia_replicate::RemoteError;
use nostalgia_warp::WarpError;

/// A specialized `Result` type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while serving requests.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your nostalgia.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Upload Errors
    // ========================================================================
    /// The multipart body had no `file` part, or the part had no file name.
    #[error("No file uploaded\n\nSuggestion: Send the image as a multipart field named 'file' with a file name")]
    MissingUpload,

    /// The multipart body could not be read.
    #[error("Invalid upload: {message}\n\nSuggestion: Send a multipart/form-data request")]
    InvalidUpload {
        /// Description of the failure.
        message: String,
    },

    /// A query parameter is out of range.
    #[error("Invalid parameter: {message}\n\nSuggestion: {suggestion}")]
    InvalidParameter {
        /// Description of the failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The uploaded file extension is not an accepted image type.
    #[error("Invalid file type '{extension}'. Allowed: .jpg, .jpeg, .png, .webp, .jfif\n\nSuggestion: Convert the image to JPEG or PNG")]
    UnsupportedFileType {
        /// The rejected extension (empty if none).
        extension: String,
    },

    /// The upload is not a decodable image.
    #[error("Could not read image '{filename}': {message}\n\nSuggestion: Check that the file is a valid, uncorrupted image")]
    UnreadableImage {
        /// Name of the uploaded file.
        filename: String,
        /// Decoder error.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// No Replicate token is configured.
    #[error("REPLICATE_API_TOKEN not set\n\nSuggestion: Set the environment variable with your Replicate API token")]
    MissingApiToken,

    /// A remote call failed and there is no fallback for it.
    #[error("Replicate API error: {0}\n\nSuggestion: {suggestion}", suggestion = .0.suggestion())]
    Remote(#[from] RemoteError),

    // ========================================================================
    // Results
    // ========================================================================
    /// A requested result file does not exist.
    #[error("file not found")]
    ResultNotFound {
        /// The requested file name.
        filename: String,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// Local image processing failed.
    #[error("Image processing error: {0}")]
    Warp(#[from] WarpError),

    /// A blocking worker panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidUpload` error.
    #[must_use]
    pub fn invalid_upload(message: impl Into<String>) -> Self {
        Self::InvalidUpload {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    #[must_use]
    pub fn invalid_parameter(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `UnsupportedFileType` error.
    #[must_use]
    pub fn unsupported_file_type(extension: impl Into<String>) -> Self {
        Self::UnsupportedFileType {
            extension: extension.into(),
        }
    }

    /// Creates a new `UnreadableImage` error.
    #[must_use]
    pub fn unreadable_image(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnreadableImage {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ResultNotFound` error.
    #[must_use]
    pub fn result_not_found(filename: impl Into<String>) -> Self {
        Self::ResultNotFound {
            filename: filename.into(),
        }
    }

    /// Returns `true` if the client sent something unusable.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingUpload
                | Self::InvalidUpload { .. }
                | Self::InvalidParameter { .. }
                | Self::UnsupportedFileType { .. }
        )
    }

    /// Returns `true` if the error is fatal at startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }
}
