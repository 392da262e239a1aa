pub mod agents;
pub mod audit;
pub mod health;
pub mod incidents;
pub mod runs;
pub mod security;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Every route requires the admin bearer token (enforced by the
/// `RequireAdmin` extractor).
///
/// ```text
/// /audit/records                                   insert record (POST)
/// /audit/security-events                           security event record (POST)
/// /audit/authentication                            login/logout/mfa record (POST)
/// /audit/exports                                   export record (POST)
/// /audit/api-access                                API access record (POST)
/// /audit/{org_id}/verify                           verify hash chain
/// /audit/{org_id}/export                           export as JSON or CSV
/// /audit/{org_id}/statistics                       per-org statistics
///
/// /runs                                            submit (POST), list (GET)
/// /runs/statistics                                 aggregate statistics
/// /runs/export                                     export with metadata
/// /runs/trend                                      hourly buckets
/// /runs/{run_id}/verify-content                    content hash check (POST)
///
/// /agents/status                                   flags and metrics summary
/// /agents/enable                                   re-enable agents (POST)
/// /agents/kill-switch                              disable agents (POST)
/// /agents/degradation                              toggle degradation (PUT)
///
/// /incidents                                       list
/// /incidents/statistics                            alert statistics
/// /incidents/{id}                                  get
/// /incidents/{id}/acknowledge                      acknowledge (POST)
/// /incidents/{id}/resolve                          resolve (POST)
///
/// /security/events                                 analyze auth event (POST)
/// /security/anomalies                              anomaly statistics
/// /security/sessions                               create (POST)
/// /security/sessions/{token}                       get, terminate (DELETE)
/// /security/sessions/user/{user_id}                list for user
/// /security/sessions/user/{user_id}/terminate      terminate all (POST)
/// /security/csrf                                   issue token (POST)
/// /security/csrf/verify                            verify token (POST)
/// /security/rate-limit/check                       count one request (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/audit", audit::router())
        .nest("/runs", runs::router())
        .nest("/agents", agents::router())
        .nest("/incidents", incidents::router())
        .nest("/security", security::router())
}
