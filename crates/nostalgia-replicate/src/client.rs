//! Authenticated Replicate HTTP client.
//!
//! [`ReplicateClient`] issues predictions with `Prefer: wait`, polls the ones
//! still running when the wait ends, downloads their output, and classifies
//! every failure into a [`RemoteError`].

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::{Prediction, RemoteError};

/// Public Replicate API root.
pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// Options for building a [`ReplicateClient`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use nostalgia_replicate::ClientOptions;
///
/// let options = ClientOptions::new(Some("r8_token".to_string()))
///     .with_api_base("http://127.0.0.1:9000/v1")
///     .with_request_timeout(Duration::from_secs(30));
/// assert_eq!(options.api_base, "http://127.0.0.1:9000/v1");
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root, without a trailing slash.
    pub api_base: String,
    /// Bearer token; `None` makes every call fail with a missing credential.
    pub token: Option<String>,
    /// Network timeout applied to every API request, and the bound on how
    /// long a running prediction is polled.
    pub request_timeout: Duration,
    /// Pause between polls of a running prediction.
    pub poll_interval: Duration,
}

impl ClientOptions {
    /// Creates options for the public API with a 120 second timeout.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            request_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Points the client at a different API root.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the network timeout for API requests.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the pause between polls of a running prediction.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// HTTP client for the Replicate API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl ReplicateClient {
    /// Builds a client from options.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the TLS backend cannot be initialised.
    pub fn new(options: ClientOptions) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| RemoteError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: options.api_base,
            token: options.token,
            request_timeout: options.request_timeout,
            poll_interval: options.poll_interval,
        })
    }

    /// Returns whether an API token is configured.
    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    /// The API root this client talks to.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn token(&self) -> Result<&str, RemoteError> {
        self.token.as_deref().ok_or_else(RemoteError::missing_credential)
    }

    /// Runs a prediction against a pinned model version.
    #[instrument(skip(self, input))]
    pub async fn create_prediction(
        &self,
        version: &str,
        input: Value,
    ) -> Result<Prediction, RemoteError> {
        let url = format!("{}/predictions", self.api_base);
        let body = json!({ "version": version, "input": input });
        self.predict(&url, &body).await
    }

    /// Runs a prediction against the latest version of `owner/name`.
    #[instrument(skip(self, input))]
    pub async fn create_model_prediction(
        &self,
        model: &str,
        input: Value,
    ) -> Result<Prediction, RemoteError> {
        let url = format!("{}/models/{model}/predictions", self.api_base);
        let body = json!({ "input": input });
        self.predict(&url, &body).await
    }

    async fn predict(&self, url: &str, body: &Value) -> Result<Prediction, RemoteError> {
        let token = self.token()?;
        let request = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(body);
        let prediction = parse_prediction(send_json(request).await?)?;
        info!(
            id = prediction.id.as_deref().unwrap_or("-"),
            status = ?prediction.status,
            "Prediction returned"
        );
        self.wait_for(prediction).await
    }

    /// Polls a prediction until it reaches a terminal status.
    ///
    /// Gives up with a transport error once `request_timeout` has passed.
    async fn wait_for(&self, mut prediction: Prediction) -> Result<Prediction, RemoteError> {
        if prediction.status.is_terminal() {
            return Ok(prediction);
        }
        let Some(id) = prediction.id.clone() else {
            return Err(RemoteError::malformed("running prediction has no id"));
        };

        let deadline = Instant::now() + self.request_timeout;
        while !prediction.status.is_terminal() {
            if Instant::now() + self.poll_interval > deadline {
                return Err(RemoteError::transport(format!(
                    "prediction {id} still {:?} after {}s",
                    prediction.status,
                    self.request_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.get_prediction(&id).await?;
            debug!(%id, status = ?prediction.status, "Polled prediction");
        }

        info!(%id, status = ?prediction.status, "Prediction finished");
        Ok(prediction)
    }

    /// Fetches the current state of a prediction.
    #[instrument(skip(self))]
    pub async fn get_prediction(&self, id: &str) -> Result<Prediction, RemoteError> {
        let token = self.token()?;
        let url = format!("{}/predictions/{id}", self.api_base);
        parse_prediction(send_json(self.http.get(url).bearer_auth(token)).await?)
    }

    /// Fetches a model description; used to verify the token and model name.
    #[instrument(skip(self))]
    pub async fn get_model(&self, model: &str) -> Result<Value, RemoteError> {
        let token = self.token()?;
        let url = format!("{}/models/{model}", self.api_base);
        send_json(self.http.get(url).bearer_auth(token)).await
    }

    /// Downloads an output file.
    ///
    /// `timeout` overrides the client's request timeout for this download.
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, RemoteError> {
        let mut request = self.http.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = checked(request.send().await?).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(RemoteError::malformed(format!("empty download from {url}")));
        }
        debug!(size = bytes.len(), "Downloaded output");
        Ok(bytes.to_vec())
    }
}

/// Fails on non-success statuses, keeping the response body as detail.
async fn checked(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), &body))
}

fn parse_prediction(value: Value) -> Result<Prediction, RemoteError> {
    serde_json::from_value(value)
        .map_err(|e| RemoteError::malformed(format!("unexpected prediction payload: {e}")))
}

async fn send_json(request: RequestBuilder) -> Result<Value, RemoteError> {
    let response = checked(request.send().await?).await?;
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| RemoteError::malformed(format!("invalid JSON payload: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::RemoteErrorKind;

    #[test]
    fn test_options_default_to_public_api() {
        let options = ClientOptions::new(Some("t".into()));
        assert_eq!(options.api_base, DEFAULT_API_BASE);
        assert_eq!(options.request_timeout, Duration::from_secs(120));
        assert_eq!(options.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let options = ClientOptions::new(Some("   ".into()));
        assert!(options.token.is_none());
    }

    #[test]
    fn test_api_base_trailing_slash_is_trimmed() {
        let options = ClientOptions::new(None).with_api_base("http://localhost:1/v1/");
        assert_eq!(options.api_base, "http://localhost:1/v1");
    }

    #[tokio::test]
    async fn test_calls_without_token_fail_fast() {
        let client = ReplicateClient::new(ClientOptions::new(None)).unwrap();
        assert!(!client.has_credential());

        let err = client
            .create_prediction("abc", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::MissingCredential);

        let err = client.get_model("owner/name").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::MissingCredential);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = ReplicateClient::new(
            ClientOptions::new(Some("t".into()))
                .with_api_base("http://127.0.0.1:9/v1")
                .with_request_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client
            .create_prediction("abc", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Transport);
        assert!(err.is_transient());
    }
}
