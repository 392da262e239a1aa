//! Handlers for incident listing and lifecycle.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use forgewatch_core::error::CoreError;
use forgewatch_core::incident::{IncidentReport, IncidentStatus};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::admin::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub notes: Option<String>,
}

async fn find(state: &AppState, id: &str) -> AppResult<IncidentReport> {
    state.alerts.incident(id).await.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Incident",
            id: id.to_string(),
        })
    })
}

/// GET /api/v1/incidents?status=active|acknowledged|resolved
pub async fn list_incidents(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<IncidentStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let incidents = state.alerts.list_incidents(status).await;
    Ok(Json(DataResponse { data: incidents }))
}

/// GET /api/v1/incidents/statistics
pub async fn statistics(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
) -> AppResult<impl IntoResponse> {
    let stats = state.alerts.get_alert_statistics().await;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/incidents/{id}
pub async fn get_incident(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let incident = find(&state, &id).await?;
    Ok(Json(DataResponse { data: incident }))
}

/// POST /api/v1/incidents/{id}/acknowledge
///
/// Only active incidents can be acknowledged; anything else is a conflict.
pub async fn acknowledge(
    State(state): State<AppState>,
    RequireAdmin(op): RequireAdmin,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let current = find(&state, &id).await?;
    if !state.alerts.acknowledge_incident(&id, &op.actor).await {
        return Err(CoreError::Conflict(format!(
            "Incident is {} and cannot be acknowledged",
            current.status.as_str()
        ))
        .into());
    }
    let incident = find(&state, &id).await?;
    Ok(Json(DataResponse { data: incident }))
}

/// POST /api/v1/incidents/{id}/resolve
pub async fn resolve(
    State(state): State<AppState>,
    RequireAdmin(op): RequireAdmin,
    Path(id): Path<String>,
    body: Option<Json<ResolveRequest>>,
) -> AppResult<impl IntoResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    find(&state, &id).await?;
    if !state
        .alerts
        .resolve_incident(&id, &op.actor, request.notes)
        .await
    {
        return Err(CoreError::Conflict("Incident is already resolved".into()).into());
    }
    let incident = find(&state, &id).await?;
    Ok(Json(DataResponse { data: incident }))
}
