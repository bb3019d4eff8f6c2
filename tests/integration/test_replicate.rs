//! Integration tests for the Replicate client against a local mock API.

#[path = "mock_replicate.rs"]
mod mock_replicate;

use std::time::Duration;

use mock_replicate::{MockReplicate, MP4_BYTES, TEST_TOKEN, WEBP_BYTES};
use nostalgia_replicate::{
    ClientOptions, EncodedImage, ExpressionEditor, RemoteErrorKind, ReplicateClient,
    ReplicateExpressionEditor, VideoGenerator,
};

fn client(mock: &MockReplicate, token: Option<&str>) -> ReplicateClient {
    ReplicateClient::new(
        ClientOptions::new(token.map(str::to_string))
            .with_api_base(mock.api_base())
            .with_request_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10)),
    )
    .expect("Failed to build client")
}

fn portrait() -> EncodedImage {
    EncodedImage::new(b"\x89PNG\r\n\x1a\nportrait".to_vec(), "image/png")
}

#[tokio::test]
async fn test_expression_editor_downloads_output() {
    let mock = mock_replicate::spawn().await;
    let editor = ReplicateExpressionEditor::new(client(&mock, Some(TEST_TOKEN)));

    let bytes = editor
        .edit_expression(&portrait())
        .await
        .expect("edit should succeed");

    assert_eq!(bytes, WEBP_BYTES);
    assert_eq!(mock.prediction_calls(), 1);
    assert_eq!(
        mock.last_auth().as_deref(),
        Some(format!("Bearer {TEST_TOKEN}").as_str())
    );

    let body = mock.last_body().expect("body recorded");
    assert!(body["version"].as_str().is_some_and(|v| !v.is_empty()));
    assert_eq!(body["input"]["smile"], 0.9);
    assert_eq!(body["input"]["output_format"], "webp");
    assert!(body["input"]["image"]
        .as_str()
        .is_some_and(|uri| uri.starts_with("data:image/png;base64,")));
}

#[tokio::test]
async fn test_running_prediction_is_polled_until_done() {
    let mock = mock_replicate::spawn().await;
    mock.keep_running(2);
    let editor = ReplicateExpressionEditor::new(client(&mock, Some(TEST_TOKEN)));

    let bytes = editor
        .edit_expression(&portrait())
        .await
        .expect("edit should succeed once the prediction finishes");

    assert_eq!(bytes, WEBP_BYTES);
    assert_eq!(mock.prediction_calls(), 1);
    assert_eq!(mock.poll_calls(), 2);
}

#[tokio::test]
async fn test_prediction_that_never_finishes_times_out() {
    let mock = mock_replicate::spawn().await;
    mock.keep_running(u32::MAX);
    let client = ReplicateClient::new(
        ClientOptions::new(Some(TEST_TOKEN.to_string()))
            .with_api_base(mock.api_base())
            .with_request_timeout(Duration::from_millis(300))
            .with_poll_interval(Duration::from_millis(50)),
    )
    .expect("Failed to build client");
    let editor = ReplicateExpressionEditor::new(client);

    let err = editor
        .edit_expression(&portrait())
        .await
        .expect_err("prediction never finishes");

    assert_eq!(err.kind, RemoteErrorKind::Transport);
    assert!(err.message.contains("pred-expression"));
    assert_eq!(mock.prediction_calls(), 1);
    assert!(mock.poll_calls() >= 1);
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let mock = mock_replicate::spawn().await;
    let editor = ReplicateExpressionEditor::new(client(&mock, Some(TEST_TOKEN)));

    let cases = [
        (401, RemoteErrorKind::Authentication, false),
        (402, RemoteErrorKind::Quota, false),
        (422, RemoteErrorKind::InvalidRequest, false),
        (429, RemoteErrorKind::RateLimit, true),
        (500, RemoteErrorKind::Server, true),
        (503, RemoteErrorKind::Server, true),
    ];

    for (status, kind, transient) in cases {
        mock.fail_next(&[status]);
        let err = editor
            .edit_expression(&portrait())
            .await
            .expect_err("queued failure should surface");
        assert_eq!(err.kind, kind, "status {status}");
        assert_eq!(err.status, Some(status));
        assert_eq!(err.is_transient(), transient, "status {status}");
        assert!(err.message.contains("mock failure"));
    }
}

#[tokio::test]
async fn test_missing_token_never_reaches_the_network() {
    let mock = mock_replicate::spawn().await;
    let editor = ReplicateExpressionEditor::new(client(&mock, None));

    assert!(!editor.is_configured());
    let err = editor
        .edit_expression(&portrait())
        .await
        .expect_err("no token");
    assert_eq!(err.kind, RemoteErrorKind::MissingCredential);
    assert_eq!(mock.prediction_calls(), 0);
}

#[tokio::test]
async fn test_video_generation_downloads_clip() {
    let mock = mock_replicate::spawn().await;
    let generator = VideoGenerator::new(client(&mock, Some(TEST_TOKEN)))
        .with_download_timeout(Duration::from_secs(5));

    let video = generator
        .generate(&portrait())
        .await
        .expect("video should generate");

    assert_eq!(video, MP4_BYTES);
    assert_eq!(mock.poll_calls(), 0);
    let body = mock.last_body().expect("body recorded");
    assert_eq!(body["input"]["resolution"], "480p");
    assert_eq!(body["input"]["num_frames"], 81);
    assert!(body.get("version").is_none());
}

#[tokio::test]
async fn test_slow_video_is_awaited() {
    let mock = mock_replicate::spawn().await;
    mock.keep_running(3);
    let generator = VideoGenerator::new(client(&mock, Some(TEST_TOKEN)));

    let video = generator
        .generate(&portrait())
        .await
        .expect("video should generate after rendering");

    assert_eq!(video, MP4_BYTES);
    assert_eq!(mock.prediction_calls(), 1);
    assert_eq!(mock.poll_calls(), 3);
}

#[tokio::test]
async fn test_check_model() {
    let mock = mock_replicate::spawn().await;

    let generator = VideoGenerator::new(client(&mock, Some(TEST_TOKEN)));
    let model = generator.check_model().await.expect("model exists");
    assert_eq!(model["owner"], "wan-video");

    let missing = VideoGenerator::new(client(&mock, Some(TEST_TOKEN))).with_model("missing/model");
    let err = missing.check_model().await.expect_err("model is missing");
    assert_eq!(err.kind, RemoteErrorKind::InvalidRequest);

    let bad_token = VideoGenerator::new(client(&mock, Some("r8_wrong")));
    let err = bad_token.check_model().await.expect_err("token is wrong");
    assert_eq!(err.kind, RemoteErrorKind::Authentication);
}

#[tokio::test]
async fn test_unreachable_api_is_transport_error() {
    let client = ReplicateClient::new(
        ClientOptions::new(Some(TEST_TOKEN.to_string()))
            .with_api_base("http://127.0.0.1:9/v1")
            .with_request_timeout(Duration::from_secs(2)),
    )
    .expect("Failed to build client");
    let editor = ReplicateExpressionEditor::new(client);

    let err = editor
        .edit_expression(&portrait())
        .await
        .expect_err("nothing listens on port 9");
    assert_eq!(err.kind, RemoteErrorKind::Transport);
    assert!(err.is_transient());
}
