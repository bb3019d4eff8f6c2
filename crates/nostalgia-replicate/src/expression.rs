//! The remote smile tier: one call to the hosted expression editor.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{EncodedImage, RemoteError, ReplicateClient};

/// Pinned version of `fofr/expression-editor`.
pub const EXPRESSION_EDITOR_VERSION: &str =
    "bf913bc90e1c44ba288ba3942a538693b72e8cc7df576f3beebe56adc0a92b86";

/// Produces a smiling version of a face image.
///
/// One call is one attempt: implementations never retry internally.
#[async_trait]
pub trait ExpressionEditor: Send + Sync {
    /// Returns the encoded output image (WEBP for the hosted model).
    async fn edit_expression(&self, image: &EncodedImage) -> Result<Vec<u8>, RemoteError>;

    /// Returns `false` if calls are certain to fail for lack of a credential.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Expression parameters sent to the model.
///
/// Only `smile` and `eyebrow` move; everything else is held neutral.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmileExpression {
    /// Smile strength.
    pub smile: f64,
    /// Eyebrow raise.
    pub eyebrow: f64,
    /// Wink amount.
    pub wink: f64,
    /// Horizontal gaze.
    pub pupil_x: f64,
    /// Vertical gaze.
    pub pupil_y: f64,
    /// "aaa" mouth shape.
    pub aaa: f64,
    /// "eee" mouth shape.
    pub eee: f64,
    /// "woo" mouth shape.
    pub woo: f64,
    /// Head pitch.
    pub rotate_pitch: f64,
    /// Head yaw.
    pub rotate_yaw: f64,
    /// Head roll.
    pub rotate_roll: f64,
    /// Blink amount.
    pub blink: f64,
    /// Output container.
    pub output_format: &'static str,
    /// Output quality, 1 to 100.
    pub output_quality: u8,
}

impl Default for SmileExpression {
    fn default() -> Self {
        Self {
            smile: 0.9,
            eyebrow: 0.1,
            wink: 0.0,
            pupil_x: 0.0,
            pupil_y: 0.0,
            aaa: 0.0,
            eee: 0.0,
            woo: 0.0,
            rotate_pitch: 0.0,
            rotate_yaw: 0.0,
            rotate_roll: 0.0,
            blink: 0.0,
            output_format: "webp",
            output_quality: 95,
        }
    }
}

impl SmileExpression {
    /// The full model input for `image`.
    #[must_use]
    pub fn to_input(&self, image: &EncodedImage) -> Value {
        let mut input =
            serde_json::to_value(self).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        if let Value::Object(map) = &mut input {
            map.insert("image".to_string(), Value::String(image.data_uri()));
        }
        input
    }
}

/// [`ExpressionEditor`] backed by Replicate's `fofr/expression-editor`.
#[derive(Debug, Clone)]
pub struct ReplicateExpressionEditor {
    client: ReplicateClient,
    version: String,
    expression: SmileExpression,
    download_timeout: Option<Duration>,
}

impl ReplicateExpressionEditor {
    /// Creates an editor using the pinned model version.
    #[must_use]
    pub fn new(client: ReplicateClient) -> Self {
        Self {
            client,
            version: EXPRESSION_EDITOR_VERSION.to_string(),
            expression: SmileExpression::default(),
            download_timeout: None,
        }
    }

    /// Uses a different model version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Overrides the timeout for downloading the output image.
    #[must_use]
    pub const fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ExpressionEditor for ReplicateExpressionEditor {
    #[instrument(skip(self, image), fields(mime = image.mime, size = image.bytes.len()))]
    async fn edit_expression(&self, image: &EncodedImage) -> Result<Vec<u8>, RemoteError> {
        let input = self.expression.to_input(image);
        let prediction = self.client.create_prediction(&self.version, input).await?;
        let urls = prediction.output_urls()?;
        let first = urls
            .first()
            .ok_or_else(|| RemoteError::malformed("empty output from model"))?;
        let bytes = self.client.download(first, self.download_timeout).await?;
        info!(size = bytes.len(), "Expression editor returned image");
        Ok(bytes)
    }

    fn is_configured(&self) -> bool {
        self.client.has_credential()
    }
}
