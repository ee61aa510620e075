//! HTTP surface tests against an in-process job service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use cutmirror_api::{create_router, ApiConfig, AppState};
use cutmirror_cache::{CacheConfig, ContentCache};
use cutmirror_editor::EditorConfig;
use cutmirror_gateway::{
    AnalysisError, AnalysisGateway, AnalysisRequest, AnalysisResult, Credential, GatewayConfig, ReasoningBackend,
};
use cutmirror_worker::{Collaborators, JobService, PipelineController, WorkerConfig};

struct OfflineBackend;

#[async_trait]
impl ReasoningBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _credential: &Credential, _request: &AnalysisRequest) -> AnalysisResult<String> {
        Err(AnalysisError::unavailable("offline"))
    }
}

fn test_router(dir: &TempDir) -> Router {
    let cache = ContentCache::new(CacheConfig {
        root: dir.path().join("cache"),
    });
    let gateway = AnalysisGateway::new(
        Arc::new(OfflineBackend),
        GatewayConfig::default().with_api_keys(["test-key"]),
    );
    let worker_config = WorkerConfig {
        work_dir: dir.path().join("work"),
        ..WorkerConfig::default()
    };
    let controller = PipelineController::new(
        worker_config,
        EditorConfig::default(),
        Collaborators::ffmpeg(Arc::new(gateway), cache),
    );
    let state = AppState::new(ApiConfig::default(), JobService::new(controller));
    create_router(state, None)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let request = Request::builder()
        .uri("/health")
        .header("X-Request-ID", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_metrics_route_absent_without_recorder() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let (status, _) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_rejects_invalid_requests() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let (status, body) = send(
        &app,
        post_json("/api/jobs", json!({"reference_path": "ref.mp4", "clip_paths": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Validation error"));

    let (status, _) = send(&app, post_json("/api/jobs", json!({"clip_paths": ["a.mp4"]}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_and_malformed_session_ids() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let (status, _) = send(&app, get("/api/jobs/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/jobs/does-not-exist/result")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/jobs/bad%20id")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreadable_reference_ends_in_error() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);
    let missing = dir.path().join("missing-reference.mp4");

    let (status, body) = send(
        &app,
        post_json(
            "/api/jobs",
            json!({"reference_path": missing.to_string_lossy(), "clip_paths": ["clip-a.mp4"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let mut latest = Value::Null;
    for _ in 0..100 {
        let (status, body) = send(&app, get(&format!("/api/jobs/{}", session_id))).await;
        assert_eq!(status, StatusCode::OK);
        latest = body;
        if latest["status"] == "error" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(latest["status"], "error");
    assert!(latest["message"].as_str().unwrap().contains("cannot read"));

    let (status, _) = send(&app, get(&format!("/api/jobs/{}/result", session_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let cancel = Request::builder()
        .method("DELETE")
        .uri(format!("/api/jobs/{}", session_id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, cancel).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], false);

    let (status, body) = send(&app, get("/api/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["session_id"], session_id.as_str());
    assert_eq!(body[0]["status"], "error");
}
