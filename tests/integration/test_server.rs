//! End-to-end tests for the smile pipeline and HTTP API, with Replicate
//! replaced by a local mock.

#[path = "mock_replicate.rs"]
mod mock_replicate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use mock_replicate::{MockReplicate, MP4_BYTES, TEST_TOKEN, WEBP_BYTES};
use nostalgia_replicate::{ClientOptions, ReplicateClient, ReplicateExpressionEditor};
use nostalgia_server::{
    create_router, AppState, Config, DisabledDetector, LocalFallback, RetryPolicy,
    SmileOrchestrator, SmileTier, SourceImage, RESULT_FILE_HEADER,
};
use nostalgia_warp::{codec, SmileWarpParams};

const BOUNDARY: &str = "nostalgia-integration-boundary";

fn scratch_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("test_nostalgia_integration_{name}_{nanos}"))
}

fn portrait_png() -> Vec<u8> {
    let image = RgbImage::from_fn(48, 48, |x, y| Rgb([(x * 5) as u8, (y * 5) as u8, 90]));
    codec::encode_png(&image).expect("encode portrait")
}

fn orchestrator(mock: &MockReplicate, delay: Duration) -> SmileOrchestrator {
    let client = ReplicateClient::new(
        ClientOptions::new(Some(TEST_TOKEN.to_string()))
            .with_api_base(mock.api_base())
            .with_request_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10)),
    )
    .expect("Failed to build client");
    let fallback = LocalFallback::new(Arc::new(DisabledDetector), SmileWarpParams::default());
    SmileOrchestrator::new(
        Arc::new(ReplicateExpressionEditor::new(client)),
        fallback,
        RetryPolicy {
            delay,
            ..RetryPolicy::default()
        },
    )
}

fn source() -> SourceImage {
    SourceImage::decode("portrait.png", portrait_png()).expect("decode portrait")
}

fn multipart_body(filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Spawns the Nostalgia server against the mock and returns its base URL.
async fn spawn_server(mock: &MockReplicate, token: Option<&str>, name: &str) -> String {
    let root = scratch_dir(name);
    let mut config = Config {
        results_dir: root.join("results"),
        temp_dir: root.join("temp"),
        ..Config::default()
    }
    .with_api_token(token.map(str::to_string));
    config.replicate.api_base = mock.api_base();
    config.smile.retry_delay_secs = 0;
    config.replicate.poll_interval_ms = 10;
    config.validate().expect("valid config");

    let router = create_router(AppState::from_config(config).expect("Failed to build state"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    format!("http://{addr}")
}

async fn post_upload(url: &str, filename: &str, bytes: &[u8]) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header(
            reqwest::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body(filename, bytes))
        .send()
        .await
        .expect("request failed")
}

// ============================================================================
// Orchestrator with the real client
// ============================================================================

#[tokio::test]
async fn test_remote_success_is_ai_tier() {
    let mock = mock_replicate::spawn().await;
    let result = orchestrator(&mock, Duration::from_millis(10))
        .produce_smile(&source())
        .await;

    assert_eq!(result.tier, SmileTier::Ai);
    assert_eq!(result.bytes, WEBP_BYTES);
    assert_eq!(result.retry.attempts, 1);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let mock = mock_replicate::spawn().await;
    mock.fail_next(&[503]);

    let result = orchestrator(&mock, Duration::from_millis(10))
        .produce_smile(&source())
        .await;

    assert_eq!(result.tier, SmileTier::Ai);
    assert_eq!(result.retry.failures.len(), 1);
    assert_eq!(mock.prediction_calls(), 2);
}

#[tokio::test]
async fn test_slow_prediction_is_awaited_not_retried() {
    let mock = mock_replicate::spawn().await;
    mock.keep_running(4);

    let result = orchestrator(&mock, Duration::from_millis(10))
        .produce_smile(&source())
        .await;

    assert_eq!(result.tier, SmileTier::Ai);
    assert_eq!(result.bytes, WEBP_BYTES);
    assert_eq!(result.retry.attempts, 1);
    assert_eq!(mock.prediction_calls(), 1);
    assert_eq!(mock.poll_calls(), 4);
}

#[tokio::test]
async fn test_persistent_server_errors_fall_back() {
    let mock = mock_replicate::spawn().await;
    mock.fail_next(&[500, 502, 503, 504]);

    let result = orchestrator(&mock, Duration::from_millis(10))
        .produce_smile(&source())
        .await;

    assert_eq!(mock.prediction_calls(), 3);
    assert_eq!(result.tier, SmileTier::Passthrough);
    assert_eq!(result.retry.failures.len(), 3);
    let decoded = codec::decode_rgb(&result.bytes).expect("passthrough is a JPEG");
    assert_eq!(decoded.dimensions(), (48, 48));
}

#[tokio::test]
async fn test_rejected_token_is_not_retried() {
    let mock = mock_replicate::spawn().await;
    mock.fail_next(&[401, 401, 401]);

    let result = orchestrator(&mock, Duration::from_secs(30))
        .produce_smile(&source())
        .await;

    assert_eq!(mock.prediction_calls(), 1);
    assert_eq!(result.tier, SmileTier::Passthrough);
}

// ============================================================================
// HTTP API
// ============================================================================

#[tokio::test]
async fn test_smile_endpoint_returns_ai_webp() {
    let mock = mock_replicate::spawn().await;
    let base = spawn_server(&mock, Some(TEST_TOKEN), "smile_ai").await;

    let response = post_upload(
        &format!("{base}/api/animate/smile"),
        "grandpa.jpg",
        &portrait_png(),
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/webp");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"smile_grandpa.webp\""
    );
    assert_eq!(response.bytes().await.expect("body").as_ref(), WEBP_BYTES);
}

#[tokio::test]
async fn test_smile_endpoint_falls_back_when_remote_is_down() {
    let mock = mock_replicate::spawn().await;
    mock.fail_next(&[500, 500, 500]);
    let base = spawn_server(&mock, Some(TEST_TOKEN), "smile_down").await;

    let response = post_upload(
        &format!("{base}/api/animate/smile"),
        "grandpa.png",
        &portrait_png(),
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.headers()["x-smile-tier"], "passthrough");
    assert_eq!(mock.prediction_calls(), 3);
}

#[tokio::test]
async fn test_video_endpoint_returns_mp4() {
    let mock = mock_replicate::spawn().await;
    let base = spawn_server(&mock, Some(TEST_TOKEN), "video").await;

    let response = post_upload(
        &format!("{base}/api/animate/video"),
        "grandpa.png",
        &portrait_png(),
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"animated_video.mp4\""
    );
    assert_eq!(response.bytes().await.expect("body").as_ref(), MP4_BYTES);
}

#[tokio::test]
async fn test_video_endpoint_waits_for_rendering() {
    let mock = mock_replicate::spawn().await;
    mock.keep_running(2);
    let base = spawn_server(&mock, Some(TEST_TOKEN), "video_slow").await;

    let response = post_upload(
        &format!("{base}/api/animate/video"),
        "grandpa.png",
        &portrait_png(),
    )
    .await;

    assert_eq!(response.status(), 200);
    assert_eq!(mock.poll_calls(), 2);
    assert_eq!(response.bytes().await.expect("body").as_ref(), MP4_BYTES);
}

#[tokio::test]
async fn test_video_endpoint_reports_quota() {
    let mock = mock_replicate::spawn().await;
    mock.fail_next(&[402]);
    let base = spawn_server(&mock, Some(TEST_TOKEN), "video_quota").await;

    let response = post_upload(
        &format!("{base}/api/animate/video"),
        "grandpa.png",
        &portrait_png(),
    )
    .await;

    assert_eq!(response.status(), 500);
    let json: serde_json::Value = response.json().await.expect("json body");
    let error = json["error"].as_str().expect("error message");
    assert!(error.contains("quota"));
    assert!(error.contains("Add credits"));
}

#[tokio::test]
async fn test_connection_check_with_valid_token() {
    let mock = mock_replicate::spawn().await;
    let base = spawn_server(&mock, Some(TEST_TOKEN), "check_ok").await;

    let json: serde_json::Value = reqwest::get(format!("{base}/api/animate/test"))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("json body");

    assert_eq!(json["status"], "success");
    assert_eq!(json["model"], "wan-video/wan-2.2-i2v-fast");
    assert_eq!(json["estimated_time"], "~39 seconds");
}

#[tokio::test]
async fn test_connection_check_with_rejected_token() {
    let mock = mock_replicate::spawn().await;
    let base = spawn_server(&mock, Some("r8_wrong"), "check_bad").await;

    let json: serde_json::Value = reqwest::get(format!("{base}/api/animate/test"))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("json body");

    assert_eq!(json["status"], "error");
    assert!(json["message"]
        .as_str()
        .is_some_and(|m| m.contains("authentication")));
    assert_eq!(json["suggestion"], "Check your REPLICATE_API_TOKEN");
}

#[tokio::test]
async fn test_saved_result_is_served() {
    let mock = mock_replicate::spawn().await;
    let base = spawn_server(&mock, None, "results").await;

    let response = post_upload(
        &format!("{base}/api/enhance/?level=30"),
        "grandma.png",
        &portrait_png(),
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"enhanced_grandma.png\""
    );
    let saved = response.headers()[RESULT_FILE_HEADER]
        .to_str()
        .expect("ascii header")
        .to_string();
    assert!(saved.starts_with("enhanced_grandma_"));

    let served = reqwest::get(format!("{base}/results/{saved}"))
        .await
        .expect("request failed");
    assert_eq!(served.status(), 200);
    assert_eq!(served.headers()["content-type"], "image/png");
    let bytes = served.bytes().await.expect("body");
    let decoded = codec::decode_rgb(&bytes).expect("served PNG");
    assert_eq!(decoded.dimensions(), (48, 48));
}
