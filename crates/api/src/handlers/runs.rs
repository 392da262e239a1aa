//! Handlers for the run log: ingestion, queries and statistics.
//!
//! Ingesting a run also feeds its metrics to AgentWatch, so budget alerts
//! are raised on the same request.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use forgewatch_core::anomaly::{AgentMetrics, AnomalyAlert};
use forgewatch_core::run_log::{RunLogEntry, RunLogFilter, RunLogParams};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::admin::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_TREND_HOURS: u32 = 24;
const MAX_TREND_HOURS: u32 = 24 * 7;

/// A completed run plus the execution-level counters AgentWatch needs.
#[derive(Debug, Deserialize)]
pub struct RunSubmission {
    #[serde(flatten)]
    pub params: RunLogParams,
    /// Fraction of failed calls in the run.
    #[serde(default)]
    pub error_rate: f64,
    #[serde(default)]
    pub timeouts: u32,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub entry: RunLogEntry,
    pub alerts: Vec<AnomalyAlert>,
}

#[derive(Debug, Deserialize)]
pub struct ContentCheck {
    pub prompt_content: Option<String>,
    pub input_content: Option<String>,
    pub output_content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContentVerification {
    pub run_id: String,
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct TrendParams {
    pub hours: Option<u32>,
}

/// POST /api/v1/runs
pub async fn submit_run(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Json(submission): Json<RunSubmission>,
) -> AppResult<impl IntoResponse> {
    let RunSubmission {
        params,
        error_rate,
        timeouts,
    } = submission;

    if params.run_id.trim().is_empty() || params.org_id.trim().is_empty() {
        return Err(AppError::BadRequest("run_id and org_id are required".into()));
    }
    if !(0.0..=1.0).contains(&error_rate) {
        return Err(AppError::BadRequest("error_rate must be between 0 and 1".into()));
    }

    let score = params.score;
    let entry = state.run_logger.log_run(params).await;
    let metrics = AgentMetrics {
        run_id: entry.run_id.clone(),
        org_id: entry.org_id.clone(),
        module_id: entry.module_id.clone(),
        tokens: entry.tokens,
        cost: entry.cost,
        duration_ms: entry.duration_ms,
        score,
        error_rate,
        timeouts,
        timestamp: entry.timestamp,
    };
    let alerts = state.agent_watch.record_metrics(metrics).await;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RunAccepted { entry, alerts },
        }),
    ))
}

/// GET /api/v1/runs
pub async fn list_runs(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Query(filter): Query<RunLogFilter>,
) -> AppResult<impl IntoResponse> {
    let entries = state.run_logger.query_logs(&filter).await;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/v1/runs/statistics
pub async fn statistics(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Query(filter): Query<RunLogFilter>,
) -> AppResult<impl IntoResponse> {
    let stats = state.run_logger.get_statistics(&filter).await;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/runs/export
pub async fn export_runs(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Query(filter): Query<RunLogFilter>,
) -> AppResult<impl IntoResponse> {
    let export = state.run_logger.export_logs(&filter).await;
    Ok(Json(DataResponse { data: export }))
}

/// GET /api/v1/runs/trend?hours=24
pub async fn trend(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Query(params): Query<TrendParams>,
) -> AppResult<impl IntoResponse> {
    let hours = params
        .hours
        .unwrap_or(DEFAULT_TREND_HOURS)
        .clamp(1, MAX_TREND_HOURS);
    let buckets = state.run_logger.logs_trend(hours).await;
    Ok(Json(DataResponse { data: buckets }))
}

/// POST /api/v1/runs/{run_id}/verify-content
pub async fn verify_content(
    State(state): State<AppState>,
    RequireAdmin(_op): RequireAdmin,
    Path(run_id): Path<String>,
    Json(check): Json<ContentCheck>,
) -> AppResult<impl IntoResponse> {
    let valid = state
        .run_logger
        .verify_content_integrity(
            &run_id,
            check.prompt_content.as_deref(),
            check.input_content.as_deref(),
            check.output_content.as_deref(),
        )
        .await;
    Ok(Json(DataResponse {
        data: ContentVerification { run_id, valid },
    }))
}
