//! Nostalgia Replicate client
//!
//! Talks to the hosted Replicate inference API on behalf of the Nostalgia
//! service:
//!
//! - [`ReplicateClient`] - authenticated HTTP client with response classification
//! - [`ExpressionEditor`] / [`ReplicateExpressionEditor`] - the remote smile tier
//! - [`VideoGenerator`] - image-to-video generation
//!
//! Every failure is reported as a [`RemoteError`] whose [`RemoteErrorKind`]
//! tells the caller whether retrying can help.

pub mod client;
pub mod expression;
pub mod video;

pub use client::{ClientOptions, ReplicateClient, DEFAULT_API_BASE};
pub use expression::{
    ExpressionEditor, ReplicateExpressionEditor, SmileExpression, EXPRESSION_EDITOR_VERSION,
};
pub use video::{VideoGenerator, VideoRequest, VIDEO_MODEL};

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No API token is configured.
    MissingCredential,
    /// The token was rejected (401/403).
    Authentication,
    /// The account is out of credit (402).
    Quota,
    /// The request was rejected as invalid (400/404/422).
    InvalidRequest,
    /// Too many requests (429).
    RateLimit,
    /// The service failed (5xx).
    Server,
    /// Connection, timeout or body read failure.
    Transport,
    /// The service answered, but not with a usable result.
    MalformedResponse,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "missing_credential"),
            Self::Authentication => write!(f, "authentication"),
            Self::Quota => write!(f, "quota"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Transport => write!(f, "transport"),
            Self::MalformedResponse => write!(f, "malformed_response"),
        }
    }
}

impl RemoteErrorKind {
    /// Classifies a non-success HTTP status.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            402 => Self::Quota,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            400..=499 => Self::InvalidRequest,
            _ => Self::MalformedResponse,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Set REPLICATE_API_TOKEN in the environment or in .env",
            Self::Authentication => "Check your REPLICATE_API_TOKEN",
            Self::Quota => "Add credits to your Replicate account",
            Self::InvalidRequest => "Check the model name, version and input image",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; Replicate may be experiencing issues",
            Self::Transport => "Check your network connection",
            Self::MalformedResponse => "Retry; the model returned no usable output",
        }
    }
}

/// A failed call to the remote inference service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// What went wrong.
    pub kind: RemoteErrorKind,
    /// Detail from the service or transport.
    pub message: String,
    /// HTTP status, when the service answered.
    pub status: Option<u16>,
}

impl RemoteError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// No API token is configured.
    #[must_use]
    pub fn missing_credential() -> Self {
        Self::new(RemoteErrorKind::MissingCredential, "REPLICATE_API_TOKEN not set")
    }

    /// Classifies a non-success HTTP response.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        Self {
            kind: RemoteErrorKind::from_status(status),
            message: format!("HTTP {status}: {}", truncate(body, 512)),
            status: Some(status),
        }
    }

    /// A connection, timeout or body read failure.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    /// A response without a usable result.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::MalformedResponse, message)
    }

    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::RateLimit
                | RemoteErrorKind::Server
                | RemoteErrorKind::Transport
                | RemoteErrorKind::MalformedResponse
        )
    }

    /// Suggestion text for this error.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        self.kind.suggestion()
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), &err.to_string());
        }
        if err.is_decode() {
            return Self::malformed(err.to_string());
        }
        Self::transport(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Encoded image bytes together with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// MIME type sent with the data URI.
    pub mime: &'static str,
}

impl EncodedImage {
    /// Wraps bytes with an explicit MIME type.
    #[must_use]
    pub const fn new(bytes: Vec<u8>, mime: &'static str) -> Self {
        Self { bytes, mime }
    }

    /// Wraps bytes, taking the MIME type from the file name's extension.
    #[must_use]
    pub fn from_path(bytes: Vec<u8>, path: impl AsRef<Path>) -> Self {
        Self::new(bytes, mime_for_path(path))
    }

    /// The image as a base64 `data:` URI.
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }
}

/// MIME type for an image path; unknown extensions are treated as JPEG.
#[must_use]
pub fn mime_for_path(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Lifecycle state of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    /// Queued, not yet running.
    Starting,
    /// Running.
    Processing,
    /// Finished with output.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Canceled before finishing.
    Canceled,
}

impl PredictionStatus {
    /// Returns whether the prediction will change no further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// The subset of a prediction response this crate reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    /// Prediction identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Current status.
    pub status: PredictionStatus,
    /// Model output; shape varies by model.
    #[serde(default)]
    pub output: Option<Value>,
    /// Error reported by the model, if any.
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// Returns the output URLs of a finished prediction.
    ///
    /// A prediction that has not finished, failed, was canceled or produced
    /// no URL is a malformed response.
    pub fn output_urls(&self) -> Result<Vec<String>, RemoteError> {
        match self.status {
            PredictionStatus::Succeeded => {}
            PredictionStatus::Starting | PredictionStatus::Processing => {
                return Err(RemoteError::malformed(
                    "prediction has not finished",
                ));
            }
            PredictionStatus::Failed | PredictionStatus::Canceled => {
                let detail = self
                    .error
                    .as_ref()
                    .map_or_else(|| "no error detail".to_string(), ToString::to_string);
                return Err(RemoteError::malformed(format!(
                    "prediction {:?}: {detail}",
                    self.status
                )));
            }
        }

        let mut urls = Vec::new();
        if let Some(output) = &self.output {
            collect_urls(output, &mut urls);
        }
        if urls.is_empty() {
            return Err(RemoteError::malformed("empty output from model"));
        }
        Ok(urls)
    }
}

/// Collects `http(s)` URLs from a string, list or `{"url": ...}` object.
fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with("http://") || s.starts_with("https://") {
                out.push(s.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_urls(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url") {
                collect_urls(url, out);
            }
        }
        _ => {}
    }
}
