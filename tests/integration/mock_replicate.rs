//! A local stand-in for the Replicate HTTP API.
//!
//! Predictions succeed with a URL pointing back at this server unless a
//! status code has been queued with [`MockReplicate::fail_next`]. With
//! [`MockReplicate::keep_running`] they come back `processing` and finish
//! after the given number of polls.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

/// Bytes served as the expression editor's output.
pub const WEBP_BYTES: &[u8] = b"RIFF\x10\0\0\0WEBPVP8 mock-smile";

/// Bytes served as the video model's output.
pub const MP4_BYTES: &[u8] = b"\0\0\0\x18ftypmp42mock-video";

/// Token the tests configure.
pub const TEST_TOKEN: &str = "r8_integration_test";

pub struct MockReplicate {
    pub base_url: String,
    failures: Mutex<VecDeque<u16>>,
    prediction_calls: AtomicU32,
    polls_remaining: AtomicU32,
    poll_calls: AtomicU32,
    last_auth: Mutex<Option<String>>,
    last_body: Mutex<Option<Value>>,
}

impl MockReplicate {
    /// The API root to hand to `ClientOptions::with_api_base`.
    pub fn api_base(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    /// Queues failing statuses for the next prediction calls.
    pub fn fail_next(&self, statuses: &[u16]) {
        self.failures
            .lock()
            .expect("lock")
            .extend(statuses.iter().copied());
    }

    pub fn prediction_calls(&self) -> u32 {
        self.prediction_calls.load(Ordering::SeqCst)
    }

    /// Makes new predictions report `processing` for `polls` status checks.
    pub fn keep_running(&self, polls: u32) {
        self.polls_remaining.store(polls, Ordering::SeqCst);
    }

    pub fn poll_calls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }

    fn prediction(&self, id: &str, status: &str) -> Value {
        let url = format!("{}/v1/predictions/{id}", self.base_url);
        let mut body = json!({ "id": id, "status": status, "urls": { "get": url } });
        if status == "succeeded" {
            body["output"] = if id == "pred-video" {
                json!([format!("{}/files/clip.mp4", self.base_url)])
            } else {
                json!(format!("{}/files/smile.webp", self.base_url))
            };
        }
        body
    }

    fn created(&self, id: &str) -> Response {
        let status = if self.polls_remaining.load(Ordering::SeqCst) > 0 {
            "processing"
        } else {
            "succeeded"
        };
        (StatusCode::CREATED, Json(self.prediction(id, status))).into_response()
    }

    pub fn last_auth(&self) -> Option<String> {
        self.last_auth.lock().expect("lock").clone()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.last_body.lock().expect("lock").clone()
    }

    fn record(&self, headers: &HeaderMap, body: Value) -> Option<u16> {
        self.prediction_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_auth.lock().expect("lock") = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_body.lock().expect("lock") = Some(body);
        self.failures.lock().expect("lock").pop_front()
    }
}

fn failure(status: u16) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(json!({ "detail": format!("mock failure {status}") }))).into_response()
}

async fn create_prediction(
    State(mock): State<Arc<MockReplicate>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(status) = mock.record(&headers, body) {
        return failure(status);
    }
    mock.created("pred-expression")
}

async fn create_model_prediction(
    State(mock): State<Arc<MockReplicate>>,
    Path((_owner, _name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(status) = mock.record(&headers, body) {
        return failure(status);
    }
    mock.created("pred-video")
}

async fn get_prediction(
    State(mock): State<Arc<MockReplicate>>,
    Path(id): Path<String>,
) -> Response {
    mock.poll_calls.fetch_add(1, Ordering::SeqCst);
    let remaining = mock
        .polls_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .unwrap_or(0);
    let status = if remaining > 1 { "processing" } else { "succeeded" };
    Json(mock.prediction(&id, status)).into_response()
}

async fn get_model(Path((owner, name)): Path<(String, String)>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"));
    if !authorized {
        return failure(401);
    }
    if owner == "missing" {
        return failure(404);
    }
    Json(json!({ "owner": owner, "name": name })).into_response()
}

async fn serve_file(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "smile.webp" => WEBP_BYTES.into_response(),
        "clip.mp4" => MP4_BYTES.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Starts the mock on an ephemeral port.
pub async fn spawn() -> Arc<MockReplicate> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let mock = Arc::new(MockReplicate {
        base_url: format!("http://{addr}"),
        failures: Mutex::new(VecDeque::new()),
        prediction_calls: AtomicU32::new(0),
        polls_remaining: AtomicU32::new(0),
        poll_calls: AtomicU32::new(0),
        last_auth: Mutex::new(None),
        last_body: Mutex::new(None),
    });

    let router = Router::new()
        .route("/v1/predictions", post(create_prediction))
        .route("/v1/predictions/:id", get(get_prediction))
        .route(
            "/v1/models/:owner/:name/predictions",
            post(create_model_prediction),
        )
        .route("/v1/models/:owner/:name", get(get_model))
        .route("/files/:name", get(serve_file))
        .with_state(Arc::clone(&mock));

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock server failed");
    });

    mock
}
