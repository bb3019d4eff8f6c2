//! Face landmark detection for the local fallback tier.
//!
//! Detection sits behind the [`LandmarkDetector`] trait. "No face" is a normal
//! outcome (`Ok(None)`), not an error.

use std::time::Duration;

use async_trait::async_trait;
use nostalgia_warp::{LandmarkSet, WarpError};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::upload::SourceImage;

/// Errors raised by a detector itself.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The detector could not be reached.
    #[error("landmark request failed: {0}")]
    Request(String),

    /// The detector answered with something unusable.
    #[error("invalid landmark response: {0}")]
    InvalidResponse(String),

    /// The returned mesh is not a complete landmark set.
    #[error(transparent)]
    Landmarks(#[from] WarpError),
}

/// Locates facial landmarks in an image.
#[async_trait]
pub trait LandmarkDetector: Send + Sync {
    /// Returns the first face's landmarks in pixel coordinates, or `None`.
    async fn detect(&self, image: &SourceImage) -> Result<Option<LandmarkSet>, DetectorError>;
}

/// A detector that never finds a face.
///
/// With it the fallback tier always passes the image through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDetector;

#[async_trait]
impl LandmarkDetector for DisabledDetector {
    async fn detect(&self, _image: &SourceImage) -> Result<Option<LandmarkSet>, DetectorError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    #[serde(default)]
    faces: Vec<SidecarFace>,
}

#[derive(Debug, Deserialize)]
struct SidecarFace {
    landmarks: Vec<[f32; 2]>,
}

/// Calls an HTTP face-mesh service.
///
/// The image is POSTed as `application/octet-stream`; the service answers
/// `{"faces": [{"landmarks": [[x, y], ...]}]}` with coordinates normalized to
/// `[0, 1]`. Only the first face is used.
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    http: reqwest::Client,
    endpoint: String,
}

impl SidecarDetector {
    /// Creates a detector for `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `DetectorError::Request` if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DetectorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Request(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl LandmarkDetector for SidecarDetector {
    #[instrument(skip(self, image), fields(endpoint = %self.endpoint))]
    async fn detect(&self, image: &SourceImage) -> Result<Option<LandmarkSet>, DetectorError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.encoded().bytes.clone())
            .send()
            .await
            .map_err(|e| DetectorError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::Request(format!("HTTP {status}")));
        }

        let body: SidecarResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        let Some(face) = body.faces.into_iter().next() else {
            debug!("No face found");
            return Ok(None);
        };

        let (width, height) = image.dimensions();
        let landmarks = LandmarkSet::from_normalized(&face.landmarks, width, height)?;
        debug!(points = landmarks.len(), "Face found");
        Ok((!landmarks.is_empty()).then_some(landmarks))
    }
}
