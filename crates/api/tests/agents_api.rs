//! Integration tests for agent status, degradation and the kill-switch.

mod common;

use axum::http::{Method, StatusCode};
use common::{get, post_json, send};
use forgewatch_db::store::RuntimeFlagStore;
use forgewatch_monitor::MonitorConfig;
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: kill-switch disables agents and re-enable clears it, both audited
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kill_switch_then_reenable() {
    let app = common::build_test_app();

    let (status, json) = post_json(
        &app.router,
        "/api/v1/agents/kill-switch",
        json!({ "reason": "runaway spend" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["agents_enabled"], false);

    let (_, status_json) = get(&app.router, "/health").await;
    assert_eq!(status_json["agents_enabled"], false);

    let (status, json) = post_json(
        &app.router,
        "/api/v1/agents/enable",
        json!({ "reason": "spend reviewed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["agents_enabled"], true);

    let actions = app
        .store
        .with_audit_records(|records| {
            records
                .iter()
                .map(|r| (r.action.clone(), r.actor_id.clone()))
                .collect::<Vec<_>>()
        })
        .await;
    let operator = Some("ops@example.com".to_string());
    assert_eq!(
        actions,
        vec![
            ("agents_disabled".to_string(), operator.clone()),
            ("agents_reenabled".to_string(), operator),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: re-enabling fails closed when the audit record cannot be written
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reenable_fails_closed_without_audit() {
    let app = common::build_test_app();
    post_json(
        &app.router,
        "/api/v1/agents/kill-switch",
        json!({ "reason": "manual stop" }),
    )
    .await;

    app.store.set_unavailable(true);
    let (status, _) = send(&app.router, Method::POST, "/api/v1/agents/enable", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!app.state.agent_watch.are_agents_enabled());
}

// ---------------------------------------------------------------------------
// Test: kill-switch needs a reason
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kill_switch_requires_reason() {
    let app = common::build_test_app();
    let (status, json) = post_json(
        &app.router,
        "/api/v1/agents/kill-switch",
        json!({ "reason": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(app.state.agent_watch.are_agents_enabled());
}

// ---------------------------------------------------------------------------
// Test: degradation toggles report whether anything changed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn degradation_toggle_is_idempotent() {
    let app = common::build_test_app();

    let (_, first) = send(
        &app.router,
        Method::PUT,
        "/api/v1/agents/degradation",
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(first["data"]["degradation_mode"], true);
    assert_eq!(first["data"]["changed"], true);

    let (_, second) = send(
        &app.router,
        Method::PUT,
        "/api/v1/agents/degradation",
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(second["data"]["changed"], false);

    let (_, off) = send(
        &app.router,
        Method::PUT,
        "/api/v1/agents/degradation",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(off["data"]["degradation_mode"], false);
    assert_eq!(off["data"]["changed"], true);

    let actions = app
        .store
        .with_audit_records(|records| {
            records
                .iter()
                .map(|r| (r.action.clone(), r.entity_type.clone()))
                .collect::<Vec<_>>()
        })
        .await;
    assert_eq!(
        actions,
        vec![
            ("degradation_enabled".to_string(), "runtime_flag".to_string()),
            ("degradation_disabled".to_string(), "runtime_flag".to_string()),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test: the environment toggle outranks persisted flags and operators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn environment_toggle_keeps_agents_disabled() {
    let app = common::build_test_app_with(MonitorConfig {
        agents_enabled: false,
        ..MonitorConfig::default()
    });
    app.store.set_flag("agents_enabled", true).await.unwrap();
    app.state.flags.load().await.unwrap();

    let (_, health) = get(&app.router, "/health").await;
    assert_eq!(health["agents_enabled"], false);

    let (status, json) = send(&app.router, Method::POST, "/api/v1/agents/enable", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert!(!app.state.agent_watch.are_agents_enabled());
}
