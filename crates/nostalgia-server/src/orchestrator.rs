//! The smile orchestrator.
//!
//! Tries the remote expression editor a bounded number of times with a fixed
//! pause between attempts, then falls back to the local tier. The outcome is
//! always a [`SmileResult`]; remote failures are recorded in its
//! [`RetryState`] rather than returned.

use std::sync::Arc;
use std::time::Duration;

use nostalgia_replicate::{ExpressionEditor, RemoteError, RemoteErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SmileConfig;
use crate::fallback::LocalFallback;
use crate::upload::SourceImage;

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmileTier {
    /// The remote model succeeded.
    Ai,
    /// The local warp found a face.
    Fallback,
    /// The original image, re-encoded.
    Passthrough,
}

impl std::fmt::Display for SmileTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ai => write!(f, "ai"),
            Self::Fallback => write!(f, "fallback"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

impl SmileTier {
    /// MIME type of the bytes produced by this tier.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Ai => "image/webp",
            Self::Fallback | Self::Passthrough => "image/jpeg",
        }
    }

    /// File extension matching [`Self::content_type`].
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Ai => "webp",
            Self::Fallback | Self::Passthrough => "jpg",
        }
    }
}

/// One failed remote attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Classified failure.
    pub kind: RemoteErrorKind,
    /// Failure detail.
    pub message: String,
}

/// Per-request record of remote attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    /// Remote attempts made.
    pub attempts: u32,
    /// Every failed attempt, in order.
    pub failures: Vec<AttemptFailure>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Set when the remote tier was skipped for lack of a credential.
    pub skipped: bool,
}

impl RetryState {
    /// Records a failed attempt.
    pub fn record_failure(&mut self, attempt: u32, error: &RemoteError) {
        self.failures.push(AttemptFailure {
            attempt,
            kind: error.kind,
            message: error.message.clone(),
        });
        self.last_error = Some(error.to_string());
    }
}

/// A produced smile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmileResult {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Which tier produced them; decides content type and extension.
    pub tier: SmileTier,
    /// Remote attempt diagnostics.
    pub retry: RetryState,
}

/// How often and how patiently to call the remote tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum remote attempts, at least 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Retry non-transient failures as well.
    pub retry_all_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(4),
            retry_all_errors: false,
        }
    }
}

impl From<&SmileConfig> for RetryPolicy {
    fn from(config: &SmileConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: config.retry_delay(),
            retry_all_errors: config.retry_all_errors,
        }
    }
}

impl RetryPolicy {
    fn should_retry(&self, error: &RemoteError) -> bool {
        self.retry_all_errors || error.is_transient()
    }
}

/// Remote tier with bounded retries, then the local tier.
#[derive(Clone)]
pub struct SmileOrchestrator {
    editor: Arc<dyn ExpressionEditor>,
    fallback: LocalFallback,
    policy: RetryPolicy,
}

impl std::fmt::Debug for SmileOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmileOrchestrator")
            .field("fallback", &self.fallback)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SmileOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        editor: Arc<dyn ExpressionEditor>,
        fallback: LocalFallback,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            editor,
            fallback,
            policy,
        }
    }

    /// The active retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Produces a smiling version of `image`. Never fails.
    pub async fn produce_smile(&self, image: &SourceImage) -> SmileResult {
        let mut retry = RetryState::default();

        if self.editor.is_configured() {
            if let Some(bytes) = self.try_remote(image, &mut retry).await {
                return SmileResult {
                    bytes,
                    tier: SmileTier::Ai,
                    retry,
                };
            }
            info!(
                attempts = retry.attempts,
                "Remote tier exhausted, using local fallback"
            );
        } else {
            warn!("No Replicate token configured, skipping remote tier");
            retry.skipped = true;
            retry.last_error = Some(RemoteError::missing_credential().to_string());
        }

        let local = self.fallback.local_smile(image).await;
        let tier = if local.found_face {
            SmileTier::Fallback
        } else {
            SmileTier::Passthrough
        };
        SmileResult {
            bytes: local.bytes,
            tier,
            retry,
        }
    }

    async fn try_remote(&self, image: &SourceImage, retry: &mut RetryState) -> Option<Vec<u8>> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            retry.attempts = attempt;
            info!(attempt, max_attempts, "Calling remote expression editor");

            match self.editor.edit_expression(image.encoded()).await {
                Ok(bytes) if !bytes.is_empty() => {
                    info!(attempt, size = bytes.len(), "Remote smile generated");
                    return Some(bytes);
                }
                Ok(_) => {
                    let error = RemoteError::malformed("empty bytes from model");
                    warn!(attempt, error = %error, "Remote attempt failed");
                    retry.record_failure(attempt, &error);
                }
                Err(error) => {
                    warn!(attempt, kind = %error.kind, error = %error, "Remote attempt failed");
                    retry.record_failure(attempt, &error);
                    if !self.policy.should_retry(&error) {
                        warn!(kind = %error.kind, "Failure is not retryable, stopping early");
                        return None;
                    }
                }
            }

            if attempt < max_attempts {
                info!(
                    delay_secs = self.policy.delay.as_secs_f64(),
                    "Waiting before next attempt"
                );
                tokio::time::sleep(self.policy.delay).await;
            }
        }
        None
    }
}
