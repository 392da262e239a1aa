//! Route definitions for incidents raised by the alert system.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::incidents;
use crate::state::AppState;

/// Incident routes mounted at `/incidents`.
///
/// ```text
/// GET  /                     -> list_incidents
/// GET  /statistics           -> statistics
/// GET  /{id}                 -> get_incident
/// POST /{id}/acknowledge     -> acknowledge
/// POST /{id}/resolve         -> resolve
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(incidents::list_incidents))
        .route("/statistics", get(incidents::statistics))
        .route("/{id}", get(incidents::get_incident))
        .route("/{id}/acknowledge", post(incidents::acknowledge))
        .route("/{id}/resolve", post(incidents::resolve))
}
