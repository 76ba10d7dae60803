// HTTP-level tests for POST /check and GET /ping.
//
// Drives the real router with tower's oneshot against in-memory
// capabilities, so every status code path is exercised without model
// files. A call counter on each fake proves when the model is (not) invoked.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use nsfwd::model::provider::ModelProvider;
use nsfwd::model::traits::{
    ClassProbabilities, ClassifierOutput, DetectionBox, DetectorOutput, ImageClassifier,
    RegionDetector,
};
use nsfwd::policy::VerdictPolicy;
use nsfwd::web::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

// ============================================================
// Fakes
// ============================================================

struct FakeClassifier {
    unsafe_: f64,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ImageClassifier for FakeClassifier {
    async fn classify(&self, path: &Path) -> Result<ClassifierOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = ClassifierOutput::new();
        out.insert(
            path.to_string_lossy().into_owned(),
            ClassProbabilities {
                safe: 1.0 - self.unsafe_,
                unsafe_: self.unsafe_,
            },
        );
        Ok(out)
    }
}

struct FakeDetector {
    detections: DetectorOutput,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RegionDetector for FakeDetector {
    async fn detect(&self, _path: &Path) -> Result<DetectorOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

struct FailingClassifier;

#[async_trait]
impl ImageClassifier for FailingClassifier {
    async fn classify(&self, path: &Path) -> Result<ClassifierOutput> {
        anyhow::bail!("cannot identify image file '{}'", path.display())
    }
}

fn classifier_state(unsafe_: f64) -> (AppState, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = ModelProvider::Classifier(Arc::new(FakeClassifier {
        unsafe_,
        calls: Arc::clone(&calls),
    }));
    (
        AppState::new(Some(provider), VerdictPolicy::default()),
        calls,
    )
}

fn detector_state(detections: DetectorOutput) -> (AppState, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = ModelProvider::Detector(Arc::new(FakeDetector {
        detections,
        calls: Arc::clone(&calls),
    }));
    (
        AppState::new(Some(provider), VerdictPolicy::default()),
        calls,
    )
}

fn unloaded_state() -> AppState {
    AppState::new(None, VerdictPolicy::default())
}

/// A real file for the existence check. Contents don't matter to the fakes.
fn temp_image(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("nsfwd-http-{name}.jpg"));
    std::fs::write(&path, b"fake image bytes").unwrap();
    path
}

fn check_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/check")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn check_path_request(path: &Path) -> Request<Body> {
    check_request(&json!({ "file_path": path.to_string_lossy() }).to_string())
}

async fn send(state: AppState, req: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ============================================================
// GET /ping
// ============================================================

#[tokio::test]
async fn ping_ok_with_model() {
    let (state, _) = classifier_state(0.1);
    let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
    let (status, body) = send(state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn ping_ok_without_model() {
    let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
    let (status, body) = send(unloaded_state(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

// ============================================================
// POST /check: rejections
// ============================================================

#[tokio::test]
async fn unloaded_model_is_503_for_any_input() {
    let image = temp_image("unloaded");
    for body in [
        json!({ "file_path": image.to_string_lossy() }).to_string(),
        json!({ "file_path": "/definitely/not/here.jpg" }).to_string(),
        "{}".to_string(),
        "garbage".to_string(),
    ] {
        let (status, json_body) = send(unloaded_state(), check_request(&body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "body: {body}");
        assert_eq!(json_body, json!({"error": "Model not loaded"}));
    }
    std::fs::remove_file(&image).unwrap();
}

#[tokio::test]
async fn missing_file_path_is_400() {
    for body in ["{}", r#"{"file_path": ""}"#, r#"{"path": "/x.jpg"}"#, "not json"] {
        let (state, calls) = classifier_state(0.9);
        let (status, json_body) = send(state, check_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body, json!({"error": "Missing file_path"}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn nonexistent_file_is_404_and_model_not_invoked() {
    let (state, calls) = classifier_state(0.9);
    let req = check_request(r#"{"file_path": "/definitely/not/here.jpg"}"#);
    let (status, body) = send(state, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "File not found"}));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn directory_path_is_404() {
    let (state, calls) = detector_state(Vec::new());
    let dir = std::env::temp_dir();
    let (status, _) = send(state, check_path_request(&dir)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inference_failure_is_500_with_message() {
    let image = temp_image("failing");
    let provider = ModelProvider::Classifier(Arc::new(FailingClassifier));
    let state = AppState::new(Some(provider), VerdictPolicy::default());

    let (status, body) = send(state, check_path_request(&image)).await;
    std::fs::remove_file(&image).unwrap();

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().unwrap();
    assert!(
        message.starts_with("cannot identify image file"),
        "got: {message}"
    );
}

// ============================================================
// POST /check: verdicts
// ============================================================

#[tokio::test]
async fn classifier_verdict_response() {
    let image = temp_image("classifier-unsafe");
    let (state, calls) = classifier_state(0.9);
    let (status, body) = send(state, check_path_request(&image)).await;
    std::fs::remove_file(&image).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_nsfw"], true);
    assert_eq!(body["probability"], 0.9);
    assert_eq!(body["details"]["unsafe"], 0.9);
    assert!(body["details"]["safe"].is_number());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn classifier_at_threshold_is_safe() {
    let image = temp_image("classifier-boundary");
    let (state, _) = classifier_state(0.5);
    let (status, body) = send(state, check_path_request(&image)).await;
    std::fs::remove_file(&image).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_nsfw"], false);
    assert_eq!(body["probability"], 0.5);
}

#[tokio::test]
async fn detector_verdict_response() {
    let image = temp_image("detector");
    let detections = vec![
        DetectionBox {
            region: [10.0, 20.0, 30.0, 40.0],
            score: 0.6,
            label: "BUTTOCKS_EXPOSED".into(),
        },
        DetectionBox {
            region: [50.0, 60.0, 70.0, 80.0],
            score: 0.8,
            label: "FEMALE_BREAST_EXPOSED".into(),
        },
        DetectionBox {
            region: [0.0, 0.0, 5.0, 5.0],
            score: 0.95,
            label: "FACE_FEMALE".into(),
        },
    ];
    let (state, calls) = detector_state(detections);
    let (status, body) = send(state, check_path_request(&image)).await;
    std::fs::remove_file(&image).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_nsfw"], true);
    assert_eq!(body["probability"], 0.8);
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 3);
    assert_eq!(details[0]["class"], "BUTTOCKS_EXPOSED");
    assert_eq!(details[0]["box"], json!([10.0, 20.0, 30.0, 40.0]));
    assert_eq!(details[2]["class"], "FACE_FEMALE");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_checks_are_identical() {
    let image = temp_image("idempotent");
    let (state, calls) = classifier_state(0.73);

    let (status_a, body_a) = send(state.clone(), check_path_request(&image)).await;
    let (status_b, body_b) = send(state, check_path_request(&image)).await;
    std::fs::remove_file(&image).unwrap();

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_a, status_b);
    assert_eq!(body_a, body_b);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_checks_share_one_provider() {
    let image = temp_image("concurrent");
    let (state, calls) = classifier_state(0.2);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let state = state.clone();
        let req = check_path_request(&image);
        handles.push(tokio::spawn(async move { send(state, req).await }));
    }
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_nsfw"], false);
    }
    std::fs::remove_file(&image).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}
