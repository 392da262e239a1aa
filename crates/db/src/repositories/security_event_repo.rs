//! Repository for the `security_events` table.

use forgewatch_core::security::SecurityEventRecord;
use forgewatch_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::security::SecurityEventRow;

/// Column list shared by SELECT and INSERT (ids are generated by the caller).
const COLUMNS: &str = "\
    id, user_id, session_id, event_type, severity, description, \
    metadata, ip_address, user_agent, created_at";

pub struct SecurityEventRepo;

impl SecurityEventRepo {
    pub async fn insert(pool: &PgPool, event: &SecurityEventRecord) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO security_events ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&query)
            .bind(&event.id)
            .bind(&event.user_id)
            .bind(&event.session_id)
            .bind(&event.event_type)
            .bind(event.severity.as_str())
            .bind(&event.description)
            .bind(&event.metadata)
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(event.created_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Events of one type since a point in time, newest first.
    pub async fn list_by_type_since(
        pool: &PgPool,
        event_type: &str,
        user_id: Option<&str>,
        since: Timestamp,
    ) -> Result<Vec<SecurityEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM security_events \
             WHERE event_type = $1 \
               AND created_at >= $2 \
               AND ($3::text IS NULL OR user_id = $3) \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, SecurityEventRow>(&query)
            .bind(event_type)
            .bind(since)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
