//! Image-to-video generation.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{EncodedImage, RemoteError, ReplicateClient};

/// Hosted image-to-video model.
pub const VIDEO_MODEL: &str = "wan-video/wan-2.2-i2v-fast";

/// Prompt and sampling parameters for a clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRequest {
    /// What the clip should show.
    pub prompt: String,
    /// What the clip should avoid.
    pub negative_prompt: String,
    /// Output resolution, e.g. `480p`.
    pub resolution: String,
    /// Number of frames to generate.
    pub num_frames: u32,
}

impl Default for VideoRequest {
    fn default() -> Self {
        Self {
            prompt: "person with natural smile, eyes blinking gently, slight head movement, \
                     looking at camera, realistic, smooth motion"
                .to_string(),
            negative_prompt: "distorted face, blurry, artifacts, unnatural movement".to_string(),
            resolution: "480p".to_string(),
            num_frames: 81,
        }
    }
}

/// Generates a short MP4 clip from a still portrait.
#[derive(Debug, Clone)]
pub struct VideoGenerator {
    client: ReplicateClient,
    model: String,
    request: VideoRequest,
    download_timeout: Duration,
}

impl VideoGenerator {
    /// Creates a generator for [`VIDEO_MODEL`] with a 180 second download timeout.
    #[must_use]
    pub fn new(client: ReplicateClient) -> Self {
        Self {
            client,
            model: VIDEO_MODEL.to_string(),
            request: VideoRequest::default(),
            download_timeout: Duration::from_secs(180),
        }
    }

    /// Uses a different `owner/name` model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the timeout for downloading the finished clip.
    #[must_use]
    pub const fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// The model this generator calls.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns whether an API token is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.client.has_credential()
    }

    fn input(&self, image: &EncodedImage) -> Value {
        let mut input = serde_json::to_value(&self.request)
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        if let Value::Object(map) = &mut input {
            map.insert("image".to_string(), Value::String(image.data_uri()));
        }
        input
    }

    /// Generates a clip and returns the MP4 bytes.
    #[instrument(skip(self, image), fields(model = %self.model, size = image.bytes.len()))]
    pub async fn generate(&self, image: &EncodedImage) -> Result<Vec<u8>, RemoteError> {
        let prediction = self
            .client
            .create_model_prediction(&self.model, self.input(image))
            .await?;
        let urls = prediction.output_urls()?;
        let url = urls
            .first()
            .ok_or_else(|| RemoteError::malformed("could not extract video URL"))?;
        info!(url = %url, "Downloading generated video");
        self.client.download(url, Some(self.download_timeout)).await
    }

    /// Checks that the token is accepted and the model exists.
    #[instrument(skip(self), fields(model = %self.model))]
    pub async fn check_model(&self) -> Result<Value, RemoteError> {
        self.client.get_model(&self.model).await
    }
}
