//! Request handlers, one module per resource.

pub mod agents;
pub mod audit;
pub mod incidents;
pub mod runs;
pub mod security;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

/// Parse an optional RFC 3339 timestamp query parameter.
pub(crate) fn parse_timestamp(value: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            v.parse::<DateTime<Utc>>()
                .map_err(|_| AppError::BadRequest(format!("Invalid date format: {v}")))
        })
        .transpose()
}
