#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use bujo_api::app::build_router;
use bujo_api::config::{DaemonConfig, ServerConfig};
use bujo_api::state::AppState;
use bujo_api::trash::TrashLedger;
use bujo_core::producers::{DEFAULT_PRODUCERS, SUBSCRIBER_BULLET_JOURNAL};
use bujo_events::NotificationHub;
use http_body_util::BodyExt;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        daemon: DaemonConfig::default(),
    }
}

/// State with `bulletJournal` registered with every default producer.
pub fn test_state() -> AppState {
    let config = test_config();
    let hub = NotificationHub::new(config.daemon.hub_config());
    hub.register(SUBSCRIBER_BULLET_JOURNAL, &DEFAULT_PRODUCERS)
        .unwrap();

    AppState {
        config: Arc::new(config),
        hub: Arc::new(hub),
        trash: Arc::new(TrashLedger::new()),
        sessions: TaskTracker::new(),
    }
}

/// Build the full application router, exercising the same middleware stack
/// production uses.
pub fn build_test_app(state: AppState) -> Router {
    build_router(state)
}

pub async fn send(app: Router, method: Method, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri).await
}

pub async fn post(app: Router, uri: &str) -> Response {
    send(app, Method::POST, uri).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
