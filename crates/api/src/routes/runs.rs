//! Route definitions for run logging.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Run routes mounted at `/runs`.
///
/// ```text
/// POST /                           -> submit_run
/// GET  /                           -> list_runs
/// GET  /statistics                 -> statistics
/// GET  /export                     -> export_runs
/// GET  /trend                      -> trend
/// POST /{run_id}/verify-content    -> verify_content
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(runs::submit_run).get(runs::list_runs))
        .route("/statistics", get(runs::statistics))
        .route("/export", get(runs::export_runs))
        .route("/trend", get(runs::trend))
        .route("/{run_id}/verify-content", post(runs::verify_content))
}
