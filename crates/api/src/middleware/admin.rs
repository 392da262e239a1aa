//! Bearer-token extractor for the operator API.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use forgewatch_core::error::CoreError;
use forgewatch_core::hashing::constant_time_eq;

use crate::error::AppError;
use crate::state::AppState;

/// Header naming the operator performing an action; recorded in audit
/// records and incident histories.
pub const ACTOR_HEADER: &str = "x-actor-id";

const DEFAULT_ACTOR: &str = "admin";

/// Requires `Authorization: Bearer <ADMIN_API_TOKEN>`. Rejects with 401
/// otherwise.
///
/// ```ignore
/// async fn handler(RequireAdmin(op): RequireAdmin) -> AppResult<Json<()>> {
///     tracing::info!(actor = %op.actor, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Operator);

#[derive(Debug, Clone)]
pub struct Operator {
    /// From the `x-actor-id` header, `admin` when absent.
    pub actor: String,
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        if !constant_time_eq(token, &state.config.admin_api_token) {
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid API token".into(),
            )));
        }

        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_ACTOR)
            .to_string();

        Ok(RequireAdmin(Operator { actor }))
    }
}
