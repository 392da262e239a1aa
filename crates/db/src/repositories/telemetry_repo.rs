//! Repository for the `telemetry_events` table.

use forgewatch_core::types::Timestamp;
use sqlx::PgPool;

pub struct TelemetryRepo;

impl TelemetryRepo {
    pub async fn insert(
        pool: &PgPool,
        event_name: &str,
        org_id: &str,
        payload: &serde_json::Value,
        created_at: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO telemetry_events (event_name, org_id, payload, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(event_name)
        .bind(org_id)
        .bind(payload)
        .bind(created_at)
        .fetch_one(pool)
        .await
    }
}
