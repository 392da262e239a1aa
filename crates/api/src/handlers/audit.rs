//! Handlers for the hash-chained audit trail.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use forgewatch_core::audit::{ExportFormat, NewAuditRecord};
use forgewatch_monitor::audit_trail::{AuthAction, SecurityAuditEvent, MAX_STATISTICS_DAYS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_timestamp;
use crate::error::AppResult;
use crate::middleware::admin::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_STATISTICS_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedRecord {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticationEntry {
    pub org_id: String,
    pub user_id: String,
    pub action: AuthAction,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Deserialize)]
pub struct ExportEntry {
    pub org_id: String,
    pub user_id: String,
    pub export_id: String,
    pub format: String,
    pub score: f64,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Deserialize)]
pub struct ApiAccessEntry {
    pub org_id: String,
    pub user_id: String,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    #[serde(default)]
    pub details: Value,
}

fn created(id: String) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedRecord { id },
        }),
    )
}

/// POST /api/v1/audit/records
///
/// Chain and persist a record. The authenticated operator becomes the actor
/// when the body names none.
pub async fn insert_record(
    State(state): State<AppState>,
    RequireAdmin(op): RequireAdmin,
    Json(mut record): Json<NewAuditRecord>,
) -> AppResult<impl IntoResponse> {
    if record.actor_id.is_none() {
        record.actor_id = Some(op.actor);
    }
    let id = state.audit.insert_audit_record(record).await?;
    Ok(created(id))
}

/// POST /api/v1/audit/security-events
///
/// Recorded under the `system` organization.
pub async fn log_security_event(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(event): Json<SecurityAuditEvent>,
) -> AppResult<impl IntoResponse> {
    let id = state.audit.log_security_event(event).await?;
    Ok(created(id))
}

/// POST /api/v1/audit/authentication
pub async fn log_authentication(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(entry): Json<AuthenticationEntry>,
) -> AppResult<impl IntoResponse> {
    let id = state
        .audit
        .log_authentication(&entry.org_id, &entry.user_id, entry.action, entry.details)
        .await?;
    Ok(created(id))
}

/// POST /api/v1/audit/exports
pub async fn log_export(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(entry): Json<ExportEntry>,
) -> AppResult<impl IntoResponse> {
    let id = state
        .audit
        .log_export(
            &entry.org_id,
            &entry.user_id,
            &entry.export_id,
            &entry.format,
            entry.score,
            entry.details,
        )
        .await?;
    Ok(created(id))
}

/// POST /api/v1/audit/api-access
pub async fn log_api_access(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(entry): Json<ApiAccessEntry>,
) -> AppResult<impl IntoResponse> {
    let id = state
        .audit
        .log_api_access(
            &entry.org_id,
            &entry.user_id,
            &entry.endpoint,
            &entry.method,
            entry.status_code,
            entry.details,
        )
        .await?;
    Ok(created(id))
}

/// GET /api/v1/audit/{org_id}/verify
pub async fn verify_chain(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(org_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let verification = state.audit.verify_audit_chain(&org_id).await?;
    Ok(Json(DataResponse { data: verification }))
}

/// GET /api/v1/audit/{org_id}/export?format=json|csv&from=X&to=Y
///
/// Returns the raw export as an attachment rather than the data envelope.
pub async fn export_records(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(org_id): Path<String>,
    Query(params): Query<ExportParams>,
) -> AppResult<impl IntoResponse> {
    let from = parse_timestamp(params.from.as_deref())?;
    let to = parse_timestamp(params.to.as_deref())?;

    let body = state
        .audit
        .export_audit_logs(&org_id, from, to, params.format)
        .await?;

    let (content_type, extension) = match params.format {
        ExportFormat::Json => ("application/json", "json"),
        ExportFormat::Csv => ("text/csv", "csv"),
    };
    let disposition = format!("attachment; filename=\"audit-{org_id}.{extension}\"");

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// GET /api/v1/audit/{org_id}/statistics?days=30
pub async fn statistics(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(org_id): Path<String>,
    Query(params): Query<StatisticsParams>,
) -> AppResult<impl IntoResponse> {
    let days = params
        .days
        .unwrap_or(DEFAULT_STATISTICS_DAYS)
        .clamp(1, MAX_STATISTICS_DAYS);
    let stats = state.audit.audit_statistics(&org_id, days).await?;
    Ok(Json(DataResponse { data: stats }))
}
