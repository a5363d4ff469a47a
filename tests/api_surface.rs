//! API-surface tests against a manager with no live browser: routing, error
//! mapping, recordings listing and artifact containment.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cdp_adapter::{DriverAdapter, DriverConfig, NoopTransport};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use simplepage::config::ServiceConfig;
use simplepage::manager::PageManager;
use simplepage::server::{router, ServeState};

struct Harness {
    app: Router,
    _recordings: TempDir,
}

fn harness() -> Harness {
    let recordings = TempDir::new().unwrap();
    let config = ServiceConfig {
        port: 0,
        headless: true,
        user_data_dir: recordings.path().join("profile"),
        screenshot: false,
        recordings_root: recordings.path().to_path_buf(),
        cors_origin: None,
        settle_timeout_ms: 1_000,
    };
    let adapter = Arc::new(DriverAdapter::with_transport(
        DriverConfig::default(),
        Arc::new(NoopTransport),
    ));
    let manager = Arc::new(PageManager::new(config.clone(), adapter));
    let app = router::build_router(&config, ServeState { manager });
    Harness {
        app,
        _recordings: recordings,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_disconnected_browser() {
    let h = harness();
    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pages"], 0);
    assert_eq!(body["browserConnected"], false);
}

#[tokio::test]
async fn unknown_page_maps_to_404() {
    let h = harness();
    let (status, body) = send(&h.app, get("/api/pages/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = send(
        &h.app,
        post("/api/pages/nope/navigate", json!({ "url": "about:blank" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn page_list_starts_empty() {
    let h = harness();
    let (status, body) = send(&h.app, get("/api/pages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn create_page_without_browser_is_5xx() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        post(
            "/api/pages",
            json!({ "name": "p", "url": "about:blank" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn recordings_list_starts_empty() {
    let h = harness();
    let (status, body) = send(&h.app, get("/api/recordings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn unknown_recording_maps_to_404() {
    let h = harness();
    let (status, _) = send(&h.app, get("/api/recordings/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn artifact_serving_rejects_traversal_shapes() {
    let h = harness();
    // Bad filename shape is refused before any filesystem access.
    let (status, _) = send(
        &h.app,
        get("/api/recordings/r-1/files/..%2F..%2Fetc%2Fpasswd"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&h.app, get("/api/recordings/r-1/files/notes.txt")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The data endpoint is narrower than the files endpoint.
    let (status, _) = send(
        &h.app,
        get("/api/recordings/r-1/data/1712000000000-structure.txt"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn replay_requires_actions() {
    let h = harness();
    let (status, body) = send(&h.app, post("/api/replay", json!({ "actions": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn replay_of_orphan_trace_reports_errors() {
    let h = harness();
    let trace = json!({
        "actions": [
            { "kind": "navigate", "timestamp": 1, "url": "https://example.test/" }
        ],
        "options": { "continueOnError": true }
    });
    let (status, body) = send(&h.app, post("/api/replay", trace)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["executedActions"], 0);
    assert_eq!(body["totalActions"], 1);
    assert_eq!(body["errors"][0]["kind"], "BadRequest");
}
