//! HTTP API for the Nostalgia service.
//!
//! # Endpoints
//!
//! - `GET /` - liveness message
//! - `POST /api/enhance/?level=0..100` - sharpen an upload, PNG out
//! - `POST /api/animate` - mirrored placeholder animation, PNG out
//! - `POST /api/animate/smile` - the smile pipeline (AI, then local fallback)
//! - `POST /api/animate/video` - image-to-video, MP4 out
//! - `GET /api/animate/test` - token and model reachability
//! - `GET /api/animate/info` - static model description
//! - `GET /results/:filename` - files written to the results directory
//!
//! Uploads are multipart forms with a single `file` field. Image results are
//! also saved to the results directory under a unique name, reported in the
//! `x-result-file` header.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use nostalgia_replicate::{
    ClientOptions, EncodedImage, ExpressionEditor, ReplicateClient, ReplicateExpressionEditor,
    VideoGenerator,
};
use nostalgia_warp::{codec, enhance};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::{Config, DetectorKind};
use crate::detector::{DisabledDetector, LandmarkDetector, SidecarDetector};
use crate::error::{Result, ServerError};
use crate::fallback::LocalFallback;
use crate::orchestrator::{RetryPolicy, SmileOrchestrator};
use crate::upload::{unique_suffix, validate_extension, SourceImage, TempUpload};

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const ESTIMATED_VIDEO_TIME: &str = "~39 seconds";

/// Response header naming the copy saved under `/results/`.
pub const RESULT_FILE_HEADER: header::HeaderName = header::HeaderName::from_static("x-result-file");

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable message.
    pub message: String,
}

/// Query string of `POST /api/enhance/`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EnhanceQuery {
    /// Enhancement level, 0 to 100.
    #[serde(default = "default_level")]
    pub level: f32,
}

const fn default_level() -> f32 {
    50.0
}

/// Body of `GET /api/animate/test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResponse {
    /// `success` or `error`.
    pub status: String,
    /// What happened.
    pub message: String,
    /// The checked model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Typical generation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    /// How to fix a missing token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    /// How to fix a failed check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

/// Body of `GET /api/animate/info`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Video model identifier.
    pub model: String,
    /// Short description.
    pub description: &'static str,
    /// What the clip shows.
    pub features: [&'static str; 4],
    /// Typical generation time.
    pub estimated_time: &'static str,
    /// Output format.
    pub output: &'static str,
    /// Approximate price per clip.
    pub cost: &'static str,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

/// Body returned when a result file does not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailResponse {
    /// Description of the problem.
    pub detail: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Read-only after startup; handlers share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The smile pipeline.
    pub orchestrator: SmileOrchestrator,
    /// Image-to-video client.
    pub video: VideoGenerator,
}

impl AppState {
    /// Creates a state from already built components.
    #[must_use]
    pub const fn new(config: Config, orchestrator: SmileOrchestrator, video: VideoGenerator) -> Self {
        Self {
            config,
            orchestrator,
            video,
        }
    }

    /// Builds the Replicate clients, detector and orchestrator described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = ReplicateClient::new(
            ClientOptions::new(config.api_token.clone())
                .with_api_base(config.replicate.api_base.as_str())
                .with_request_timeout(Duration::from_secs(config.replicate.request_timeout_secs))
                .with_poll_interval(Duration::from_millis(config.replicate.poll_interval_ms)),
        )?;

        let editor: Arc<dyn ExpressionEditor> = Arc::new(
            ReplicateExpressionEditor::new(client.clone())
                .with_version(config.replicate.expression_model_version.as_str()),
        );
        let detector = build_detector(&config)?;
        let fallback = LocalFallback::new(detector, config.smile.warp)
            .with_jpeg_quality(config.smile.jpeg_quality);
        let orchestrator =
            SmileOrchestrator::new(editor, fallback, RetryPolicy::from(&config.smile));

        let video = VideoGenerator::new(client)
            .with_model(config.replicate.video_model.as_str())
            .with_download_timeout(Duration::from_secs(config.replicate.download_timeout_secs));

        if !config.has_api_token() {
            warn!("REPLICATE_API_TOKEN not set; smiles will use the local fallback and video is disabled");
        }

        Ok(Self::new(config, orchestrator, video))
    }
}

fn build_detector(config: &Config) -> Result<Arc<dyn LandmarkDetector>> {
    match config.landmarks.detector {
        DetectorKind::Disabled => Ok(Arc::new(DisabledDetector)),
        DetectorKind::Sidecar => {
            let endpoint = config.landmarks.endpoint.clone().unwrap_or_default();
            let detector =
                SidecarDetector::new(endpoint, Duration::from_secs(config.landmarks.timeout_secs))
                    .map_err(|e| {
                        ServerError::config_validation(
                            e.to_string(),
                            "Check landmarks.endpoint in your nostalgia.json",
                        )
                    })?;
            Ok(Arc::new(detector))
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
struct ApiError(ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if let ServerError::ResultNotFound { filename } = &err {
            info!(filename = %filename, "Result not found");
            let body = Json(DetailResponse {
                detail: err.to_string(),
            });
            return (StatusCode::NOT_FOUND, body).into_response();
        }

        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        warn!(status = status.as_u16(), error = %err, "Request failed");

        let body = Json(ErrorResponse {
            error: err.to_string(),
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints, CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/enhance/", post(handle_enhance))
        .route("/animate", post(handle_animate))
        .route("/animate/smile", post(handle_smile))
        .route("/animate/video", post(handle_video))
        .route("/animate/test", get(handle_test_connection))
        .route("/animate/info", get(handle_model_info));

    Router::new()
        .route("/", get(handle_root))
        .route("/results/:filename", get(handle_result_file))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Upload helpers
// ============================================================================

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::invalid_upload(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or(ServerError::MissingUpload)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::invalid_upload(e.body_text()))?;
        info!(filename = %filename, size = bytes.len(), "Received upload");
        return Ok(Upload {
            filename,
            bytes: bytes.to_vec(),
        });
    }
    Err(ServerError::MissingUpload)
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Task(e.to_string()))?
}

async fn decode_upload(upload: Upload) -> Result<SourceImage> {
    run_blocking(move || SourceImage::decode(upload.filename, upload.bytes)).await
}

async fn write_result(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), size = bytes.len(), "Saved result");
    Ok(())
}

fn file_response(content_type: &str, download_name: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{download_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// A download response that also names the saved copy under `/results/`.
fn saved_file_response(
    content_type: &str,
    download_name: &str,
    saved_name: &str,
    bytes: Vec<u8>,
) -> Response {
    let mut response = file_response(content_type, download_name, bytes);
    if let Ok(value) = header::HeaderValue::from_str(saved_name) {
        response.headers_mut().insert(RESULT_FILE_HEADER, value);
    }
    response
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /`.
async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Deep Nostalgia API running".to_string(),
    })
}

/// Handler for `POST /api/enhance/`.
async fn handle_enhance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EnhanceQuery>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    if !(0.0..=100.0).contains(&query.level) {
        return Err(ServerError::invalid_parameter(
            format!("level must be between 0 and 100, got {}", query.level),
            "Pass ?level= with a value from 0 (original) to 100 (strongest)",
        )
        .into());
    }

    let upload = read_upload(multipart).await?;
    let source = decode_upload(upload).await?;
    let factor = enhance::level_to_factor(query.level);
    info!(level = query.level, factor, "Enhancing image");

    let pixels = source.shared_pixels();
    let png = run_blocking(move || {
        let sharpened = enhance::sharpen(&pixels, factor);
        Ok(codec::encode_png(&sharpened)?)
    })
    .await?;

    let stem = source.stem();
    let saved_name = format!("enhanced_{stem}_{}.png", unique_suffix());
    write_result(&state.config.results_dir, &saved_name, &png).await?;
    let download_name = format!("enhanced_{stem}.png");
    Ok(saved_file_response("image/png", &download_name, &saved_name, png))
}

/// Handler for `POST /api/animate`.
async fn handle_animate(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let source = decode_upload(upload).await?;

    let pixels = source.shared_pixels();
    let png = run_blocking(move || {
        let mirrored = enhance::mirror_side_by_side(&pixels, enhance::MAX_ANIMATION_WIDTH);
        Ok(codec::encode_png(&mirrored)?)
    })
    .await?;

    let stem = source.stem();
    let saved_name = format!("animated_{stem}_{}.png", unique_suffix());
    write_result(&state.config.results_dir, &saved_name, &png).await?;
    let download_name = format!("animated_{stem}.png");
    Ok(saved_file_response("image/png", &download_name, &saved_name, png))
}

/// Handler for `POST /api/animate/smile`.
///
/// Only an undecodable upload fails; every other problem degrades to a
/// lower tier.
async fn handle_smile(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let extension = validate_extension(&upload.filename)?;

    let staged = TempUpload::write(&state.config.temp_dir, &extension, &upload.bytes).await?;
    let bytes = tokio::fs::read(staged.path())
        .await
        .map_err(ServerError::from)?;
    let source = decode_upload(Upload {
        filename: upload.filename,
        bytes,
    })
    .await?;

    let result = state.orchestrator.produce_smile(&source).await;
    let stem = source.stem();
    let saved_name = format!("smile_{stem}_{}.{}", unique_suffix(), result.tier.extension());
    write_result(&state.config.results_dir, &saved_name, &result.bytes).await?;
    drop(staged);

    info!(
        tier = %result.tier,
        attempts = result.retry.attempts,
        failures = result.retry.failures.len(),
        "Smile request complete"
    );

    let download_name = format!("smile_{stem}.{}", result.tier.extension());
    let mut response = saved_file_response(
        result.tier.content_type(),
        &download_name,
        &saved_name,
        result.bytes,
    );
    if let Ok(tier) = header::HeaderValue::from_str(&result.tier.to_string()) {
        response.headers_mut().insert("x-smile-tier", tier);
    }
    Ok(response)
}

/// Handler for `POST /api/animate/video`.
async fn handle_video(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    if !state.video.is_configured() {
        return Err(ServerError::MissingApiToken.into());
    }

    let upload = read_upload(multipart).await?;
    let image = EncodedImage::from_path(upload.bytes, &upload.filename);
    info!(model = state.video.model(), "Starting video generation");

    let video = state.video.generate(&image).await.map_err(ServerError::from)?;
    info!(size = video.len(), "Video generated");
    Ok(file_response("video/mp4", "animated_video.mp4", video))
}

/// Handler for `GET /api/animate/test`.
async fn handle_test_connection(State(state): State<Arc<AppState>>) -> Json<ConnectionTestResponse> {
    let checked_at = Utc::now();
    if !state.video.is_configured() {
        return Json(ConnectionTestResponse {
            status: "error".to_string(),
            message: "REPLICATE_API_TOKEN not set".to_string(),
            model: None,
            estimated_time: None,
            solution: Some("Set the environment variable with your Replicate API token".to_string()),
            suggestion: None,
            checked_at,
        });
    }

    match state.video.check_model().await {
        Ok(_) => Json(ConnectionTestResponse {
            status: "success".to_string(),
            message: "Replicate API token is valid and model exists!".to_string(),
            model: Some(state.video.model().to_string()),
            estimated_time: Some(ESTIMATED_VIDEO_TIME.to_string()),
            solution: None,
            suggestion: None,
            checked_at,
        }),
        Err(e) => {
            warn!(error = %e, "Model check failed");
            Json(ConnectionTestResponse {
                status: "error".to_string(),
                message: format!("Error: {e}"),
                model: Some(state.video.model().to_string()),
                estimated_time: None,
                solution: None,
                suggestion: Some(e.suggestion().to_string()),
                checked_at,
            })
        }
    }
}

/// Handler for `GET /api/animate/info`.
async fn handle_model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    Json(ModelInfo {
        model: state.video.model().to_string(),
        description: "Fast image-to-video generation with natural face animation",
        features: [
            "Natural eye blinking",
            "Smile generation",
            "Subtle head movement",
            "Smooth realistic motion",
        ],
        estimated_time: ESTIMATED_VIDEO_TIME,
        output: "480p MP4 video (~5 seconds)",
        cost: "~$0.03-0.05 per video",
    })
}

/// Handler for `GET /results/:filename`.
async fn handle_result_file(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> std::result::Result<Response, ApiError> {
    if filename.contains(['/', '\\']) || filename.contains("..") || filename.is_empty() {
        return Err(ServerError::result_not_found(filename).into());
    }

    let path = state.config.results_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::result_not_found(filename).into());
        }
        Err(e) => return Err(ServerError::from(e).into()),
    };

    let content_type = content_type_for(&filename);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

// ============================================================================
// Tests
// ============================================================================
