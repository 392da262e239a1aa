//! Repository for the `incidents` table.

use forgewatch_core::incident::IncidentReport;
use sqlx::PgPool;

use crate::models::incident::IncidentRow;
use crate::StoreError;

pub struct IncidentRepo;

impl IncidentRepo {
    /// Insert a new incident or overwrite the stored copy.
    pub async fn upsert(pool: &PgPool, incident: &IncidentReport) -> Result<(), StoreError> {
        let report = serde_json::to_value(incident)?;
        sqlx::query(
            "INSERT INTO incidents \
                 (id, org_id, alert_type, severity, status, started_at, resolved_at, report, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 severity = EXCLUDED.severity, \
                 resolved_at = EXCLUDED.resolved_at, \
                 report = EXCLUDED.report, \
                 updated_at = NOW()",
        )
        .bind(&incident.id)
        .bind(&incident.org_id)
        .bind(incident.alert_type.as_str())
        .bind(incident.severity.as_str())
        .bind(incident.status.as_str())
        .bind(incident.started_at)
        .bind(incident.resolved_at)
        .bind(report)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Active and acknowledged incidents, oldest first.
    pub async fn list_unresolved(pool: &PgPool) -> Result<Vec<IncidentRow>, sqlx::Error> {
        sqlx::query_as::<_, IncidentRow>(
            "SELECT id, report FROM incidents \
             WHERE status <> 'resolved' \
             ORDER BY started_at ASC",
        )
        .fetch_all(pool)
        .await
    }
}
