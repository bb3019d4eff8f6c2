//! Nostalgia server
//!
//! The smile orchestration pipeline, its local fallback tier, and the HTTP API.

pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod upload;

pub use api::{
    create_router, AppState, ConnectionTestResponse, DetailResponse, ErrorResponse,
    MessageResponse, ModelInfo, MAX_UPLOAD_BYTES, RESULT_FILE_HEADER,
};
pub use config::{Config, DetectorKind, LandmarkConfig, ReplicateConfig, SmileConfig, API_TOKEN_ENV};
pub use detector::{DetectorError, DisabledDetector, LandmarkDetector, SidecarDetector};
pub use error::{Result, ServerError};
pub use fallback::{LocalFallback, LocalSmile};
pub use orchestrator::{
    AttemptFailure, RetryPolicy, RetryState, SmileOrchestrator, SmileResult, SmileTier,
};
pub use upload::{SourceImage, TempUpload, ALLOWED_EXTENSIONS};
