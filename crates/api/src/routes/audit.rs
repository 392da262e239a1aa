//! Route definitions for the audit trail.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::audit;
use crate::state::AppState;

/// Audit routes mounted at `/audit`.
///
/// ```text
/// POST /records                -> insert_record
/// POST /security-events        -> log_security_event
/// POST /authentication         -> log_authentication
/// POST /exports                -> log_export
/// POST /api-access             -> log_api_access
/// GET  /{org_id}/verify        -> verify_chain
/// GET  /{org_id}/export        -> export_records
/// GET  /{org_id}/statistics    -> statistics
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/records", post(audit::insert_record))
        .route("/security-events", post(audit::log_security_event))
        .route("/authentication", post(audit::log_authentication))
        .route("/exports", post(audit::log_export))
        .route("/api-access", post(audit::log_api_access))
        .route("/{org_id}/verify", get(audit::verify_chain))
        .route("/{org_id}/export", get(audit::export_records))
        .route("/{org_id}/statistics", get(audit::statistics))
}
