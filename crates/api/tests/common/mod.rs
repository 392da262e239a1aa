#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use forgewatch_api::config::ServerConfig;
use forgewatch_api::router::build_app_router;
use forgewatch_api::state::{AppState, Stores};
use forgewatch_db::MemoryStore;
use forgewatch_events::{TelemetryBus, WebhookDelivery};
use forgewatch_monitor::notifier::ChannelNotifier;
use forgewatch_monitor::{ChannelConfig, MonitorConfig};

pub const TEST_TOKEN: &str = "test-token";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        admin_api_token: TEST_TOKEN.to_string(),
        database_url: None,
        csrf_secret: Some("test-csrf-secret".to_string()),
    }
}

/// A running application over an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    /// Stops the alert forwarder when the test ends.
    cancel: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the full application router over a fresh [`MemoryStore`], with
/// only the console alert channel and the alert forwarder running.
pub fn build_test_app() -> TestApp {
    build_test_app_with(MonitorConfig::default())
}

/// Like [`build_test_app`] with custom monitoring settings.
pub fn build_test_app_with(monitor: MonitorConfig) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(ChannelNotifier::new(WebhookDelivery::new(), None));

    let (state, alert_queue) = AppState::build(
        config.clone(),
        &monitor,
        &ChannelConfig::default(),
        notifier,
        Stores::from_backend(store.clone()),
        Arc::new(TelemetryBus::default()),
    );

    let cancel = CancellationToken::new();
    state.alerts.clone().run_forwarder(alert_queue, cancel.clone());

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        store,
        cancel,
    }
}

/// Send a request with the admin token and return the response status and
/// parsed JSON body (`Value::Null` when the body is empty or not JSON).
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
        .header("x-actor-id", "ops@example.com");
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response.into_body()).await)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
