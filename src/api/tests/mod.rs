use super::*;
use crate::downloader::test_helpers::{USER, create_test_downloader, wait_for_terminal};
use crate::types::{JobId, UserId};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mod books;

/// Router over a fresh test downloader with default config
async fn test_app() -> (Router, Arc<AudiobookDownloader>, TempDir) {
    let (downloader, temp_dir) = create_test_downloader().await;
    let downloader = Arc::new(downloader);
    let config = downloader.get_config();
    let app = create_router(downloader.clone(), config);
    (app, downloader, temp_dir)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
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

/// Submit one book over HTTP and return its job id
async fn submit(app: &Router, user: i64, book_id: &str) -> JobId {
    let response = send(
        app,
        Method::POST,
        &format!("/users/{user}/jobs"),
        Some(json!({"books": [{"book_id": book_id}]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    JobId(body_json(response).await["created"][0].as_i64().unwrap())
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn(start_api_server(Arc::new(downloader), config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn test_api_key_guards_every_route() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let mut config = (*downloader.config).clone();
    config.api.api_key = Some("s3cret".into());
    let app = create_router(Arc::new(downloader), Arc::new(config));

    for uri in ["/health", "/users/1/jobs", "/users/1/books"] {
        let response = send(&app, Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let request = Request::builder()
        .uri("/users/1/jobs")
        .header("X-Api-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cors_headers() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let mut config = (*downloader.config).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["http://app.example".into()];
    let app = create_router(Arc::new(downloader), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://app.example")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://app.example"
    );

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_cors_disabled() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let mut config = (*downloader.config).clone();
    config.api.cors_enabled = false;
    let app = create_router(Arc::new(downloader), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://app.example")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let downloader = Arc::new(downloader);

    let mut config = (*downloader.config).clone();
    config.api.swagger_ui = false;
    let app = create_router(downloader.clone(), Arc::new(config.clone()));
    let response = send(&app, Method::GET, "/api/v1/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    config.api.swagger_ui = true;
    let app = create_router(downloader, Arc::new(config));
    let response = send(&app, Method::GET, "/api/v1/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}
