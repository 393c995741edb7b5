use super::*;
use crate::tasks::test_helpers::{
    SAMPLE_PDF, StubEngine, create_test_registry, submit_sample, test_config, wait_for_status,
    wait_until,
};
use crate::types::TaskStatus;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mod cache;
mod events;
mod tasks;

const BOUNDARY: &str = "doctrans-test-boundary";

/// Router over a fresh registry driven by a gated stub engine
async fn create_test_app() -> (Router, TaskRegistry, Arc<StubEngine>, TempDir) {
    let engine = StubEngine::gated();
    let (registry, temp_dir) = create_test_registry(engine.clone()).await;
    (create_router(registry.clone()), registry, engine, temp_dir)
}

/// One multipart part: (field name, optional file name, bytes)
type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let body = multipart_body(parts);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns_and_stops() {
    let engine = StubEngine::gated();
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let registry = crate::tasks::test_helpers::registry_from_config(config, engine).await;

    let shutdown = tokio_util::sync::CancellationToken::new();
    let api_handle = tokio::spawn(start_api_server(registry, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _registry, _engine, _temp_dir) = create_test_app().await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS headers should be present when enabled"
    );
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let engine = StubEngine::gated();
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.api.cors_origins = vec!["http://allowed.example".to_string()];
    let registry = crate::tasks::test_helpers::registry_from_config(config, engine).await;
    let app = create_router(registry);

    let allowed = Request::builder()
        .uri("/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, allowed).await;
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://allowed.example"
    );

    let denied = Request::builder()
        .uri("/health")
        .header("Origin", "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, denied).await;
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let engine = StubEngine::gated();
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.api.cors_enabled = false;
    let registry = crate::tasks::test_helpers::registry_from_config(config, engine).await;
    let app = create_router(registry);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (app, _registry, _engine, _temp_dir) = create_test_app().await;
    let response = send(&app, empty_request("GET", "/api-docs/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let engine = StubEngine::gated();
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.api.swagger_ui = false;
    let registry = crate::tasks::test_helpers::registry_from_config(config, engine).await;
    let app = create_router(registry);

    let response = send(&app, empty_request("GET", "/api-docs/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _registry, _engine, _temp_dir) = create_test_app().await;
    let response = send(&app, empty_request("GET", "/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
