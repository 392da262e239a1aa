//! Handlers for the auth-side security pipeline: event analysis, anomaly
//! statistics, sessions, CSRF tokens and rate-limit checks.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use forgewatch_core::error::CoreError;
use forgewatch_core::security::AuthEvent;
use forgewatch_monitor::security::detector::MAX_STATS_HOURS;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::admin::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_STATS_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AnomalyStatsParams {
    pub user_id: Option<String>,
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub user_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Terminate the least recently active sessions beyond this count.
    pub max_sessions: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SessionListParams {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct TerminateAllRequest {
    pub keep_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Terminated {
    pub terminated: u64,
}

#[derive(Debug, Deserialize)]
pub struct CsrfIssueRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CsrfToken {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CsrfVerifyRequest {
    pub session_id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct Validity {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitCheck {
    pub identifier: String,
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub blocked: bool,
}

// ---------------------------------------------------------------------------
// Events and anomalies
// ---------------------------------------------------------------------------

/// POST /api/v1/security/events
pub async fn analyze_event(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(event): Json<AuthEvent>,
) -> AppResult<impl IntoResponse> {
    if event.user_id.trim().is_empty() || event.event_type.trim().is_empty() {
        return Err(CoreError::Validation("user_id and event_type are required".into()).into());
    }
    let anomalies = state.detector.analyze_event(&event).await?;
    Ok(Json(DataResponse { data: anomalies }))
}

/// GET /api/v1/security/anomalies?user_id=X&hours=24
pub async fn anomaly_stats(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Query(params): Query<AnomalyStatsParams>,
) -> AppResult<impl IntoResponse> {
    let hours = params
        .hours
        .unwrap_or(DEFAULT_STATS_HOURS)
        .clamp(1, MAX_STATS_HOURS);
    let stats = state
        .detector
        .anomaly_stats(params.user_id.as_deref(), hours)
        .await?;
    Ok(Json(DataResponse { data: stats }))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// POST /api/v1/security/sessions
pub async fn create_session(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(request): Json<CreateSession>,
) -> AppResult<impl IntoResponse> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id is required".into()));
    }
    let session = state
        .sessions
        .create_session(&request.user_id, request.ip_address, request.user_agent)
        .await?;
    if let Some(max) = request.max_sessions {
        state.sessions.enforce_limit(&request.user_id, max.max(1)).await?;
    }
    Ok((StatusCode::CREATED, Json(DataResponse { data: session })))
}

/// GET /api/v1/security/sessions/user/{user_id}?active_only=true
pub async fn list_sessions(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(user_id): Path<String>,
    Query(params): Query<SessionListParams>,
) -> AppResult<impl IntoResponse> {
    let sessions = if params.active_only {
        state.sessions.active_sessions(&user_id).await?
    } else {
        state.sessions.list_sessions(&user_id).await?
    };
    Ok(Json(DataResponse { data: sessions }))
}

/// GET /api/v1/security/sessions/{token}
pub async fn get_session(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session = state.sessions.get_session(&token).await?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Session",
            id: "token".into(),
        })
    })?;
    state.sessions.touch(&token).await?;
    Ok(Json(DataResponse { data: session }))
}

/// DELETE /api/v1/security/sessions/{token}
pub async fn terminate_session(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !state.sessions.terminate(&token, None).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Session",
            id: "token".into(),
        }));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/security/sessions/user/{user_id}/terminate
pub async fn terminate_all_sessions(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(user_id): Path<String>,
    Json(request): Json<TerminateAllRequest>,
) -> AppResult<impl IntoResponse> {
    let terminated = state
        .sessions
        .terminate_all(&user_id, request.keep_token.as_deref())
        .await?;
    Ok(Json(DataResponse {
        data: Terminated { terminated },
    }))
}

// ---------------------------------------------------------------------------
// CSRF and rate limiting
// ---------------------------------------------------------------------------

/// POST /api/v1/security/csrf
pub async fn issue_csrf(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(request): Json<CsrfIssueRequest>,
) -> AppResult<impl IntoResponse> {
    let token = state.csrf.issue(&request.session_id);
    Ok(Json(DataResponse {
        data: CsrfToken { token },
    }))
}

/// POST /api/v1/security/csrf/verify
pub async fn verify_csrf(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(request): Json<CsrfVerifyRequest>,
) -> AppResult<impl IntoResponse> {
    let valid = state.csrf.verify(&request.session_id, &request.token);
    Ok(Json(DataResponse {
        data: Validity { valid },
    }))
}

/// POST /api/v1/security/rate-limit/check
///
/// Counts one request for `identifier` at `endpoint`.
pub async fn check_rate_limit(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(request): Json<RateLimitCheck>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let allowed = state
        .rate_limiter
        .check(&request.identifier, &request.endpoint, now);
    let blocked = state
        .rate_limiter
        .is_blocked(&request.identifier, &request.endpoint, now);
    Ok(Json(DataResponse {
        data: RateLimitDecision { allowed, blocked },
    }))
}
