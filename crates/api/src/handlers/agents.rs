//! Handlers for agent status, degradation and the kill-switch.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use forgewatch_core::anomaly::MetricsSummary;
use forgewatch_core::error::CoreError;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::admin::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    pub agents_enabled: bool,
    pub degradation_mode: bool,
    pub summary: MetricsSummary,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnableRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DegradationRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct DegradationChange {
    pub degradation_mode: bool,
    /// `false` when the mode already had the requested value.
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct KillSwitchRequest {
    pub reason: String,
}

async fn status(state: &AppState) -> AgentStatus {
    AgentStatus {
        agents_enabled: state.agent_watch.are_agents_enabled(),
        degradation_mode: state.agent_watch.degradation_mode(),
        summary: state.agent_watch.metrics_summary().await,
    }
}

/// GET /api/v1/agents/status
pub async fn get_status(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: status(&state).await,
    }))
}

/// POST /api/v1/agents/enable
///
/// Clears the kill-switch. Fails without re-enabling if the audit record
/// cannot be written, and with 409 while the environment toggle is off.
pub async fn enable(
    State(state): State<AppState>,
    RequireAdmin(op): RequireAdmin,
    body: Option<Json<EnableRequest>>,
) -> AppResult<impl IntoResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    state
        .agent_watch
        .reenable_agents(&op.actor, request.reason.as_deref())
        .await?;
    Ok(Json(DataResponse {
        data: status(&state).await,
    }))
}

/// POST /api/v1/agents/kill-switch
///
/// Agents stop before the audit record is written, so an audit failure
/// still leaves them disabled.
pub async fn kill_switch(
    State(state): State<AppState>,
    RequireAdmin(op): RequireAdmin,
    Json(request): Json<KillSwitchRequest>,
) -> AppResult<impl IntoResponse> {
    if request.reason.trim().is_empty() {
        return Err(CoreError::Validation("reason is required".into()).into());
    }
    tracing::warn!(actor = %op.actor, reason = %request.reason, "Manual kill-switch requested");
    state
        .agent_watch
        .manual_kill_switch(&op.actor, &request.reason)
        .await?;
    Ok(Json(DataResponse {
        data: status(&state).await,
    }))
}

/// PUT /api/v1/agents/degradation
pub async fn set_degradation(
    State(state): State<AppState>,
    RequireAdmin(op): RequireAdmin,
    Json(request): Json<DegradationRequest>,
) -> AppResult<impl IntoResponse> {
    let changed = state
        .agent_watch
        .set_degradation_mode(&op.actor, request.enabled)
        .await?;
    tracing::info!(actor = %op.actor, enabled = request.enabled, changed, "Degradation mode set");
    Ok(Json(DataResponse {
        data: DegradationChange {
            degradation_mode: state.agent_watch.degradation_mode(),
            changed,
        },
    }))
}
