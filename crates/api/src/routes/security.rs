//! Route definitions for the security pipeline.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::security;
use crate::state::AppState;

/// Security routes mounted at `/security`.
///
/// ```text
/// POST   /events                              -> analyze_event
/// GET    /anomalies                           -> anomaly_stats
/// POST   /sessions                            -> create_session
/// GET    /sessions/{token}                    -> get_session
/// DELETE /sessions/{token}                    -> terminate_session
/// GET    /sessions/user/{user_id}             -> list_sessions
/// POST   /sessions/user/{user_id}/terminate   -> terminate_all_sessions
/// POST   /csrf                                -> issue_csrf
/// POST   /csrf/verify                         -> verify_csrf
/// POST   /rate-limit/check                    -> check_rate_limit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", post(security::analyze_event))
        .route("/anomalies", get(security::anomaly_stats))
        .route("/sessions", post(security::create_session))
        .route(
            "/sessions/{token}",
            get(security::get_session).delete(security::terminate_session),
        )
        .route("/sessions/user/{user_id}", get(security::list_sessions))
        .route(
            "/sessions/user/{user_id}/terminate",
            post(security::terminate_all_sessions),
        )
        .route("/csrf", post(security::issue_csrf))
        .route("/csrf/verify", post(security::verify_csrf))
        .route("/rate-limit/check", post(security::check_rate_limit))
}
