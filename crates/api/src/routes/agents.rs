use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::agents;
use crate::state::AppState;

/// Agent control routes mounted at `/agents`.
///
/// ```text
/// GET  /status         -> get_status
/// POST /enable         -> enable
/// POST /kill-switch    -> kill_switch
/// PUT  /degradation    -> set_degradation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(agents::get_status))
        .route("/enable", post(agents::enable))
        .route("/kill-switch", post(agents::kill_switch))
        .route("/degradation", put(agents::set_degradation))
}
