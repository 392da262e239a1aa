//! Repository for the `run_logs` table.

use forgewatch_core::run_log::RunLogEntry;
use sqlx::PgPool;

/// Column list for INSERT (excludes the generated `id`).
const INSERT_COLUMNS: &str = "\
    run_id, org_id, module_id, signature_7d, model, tokens, cost, \
    verdict, export_formats, content_hash, duration_ms, error_code, \
    metadata, logged_at";

pub struct RunLogRepo;

impl RunLogRepo {
    pub async fn insert(pool: &PgPool, entry: &RunLogEntry) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO run_logs ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        let metadata = entry.metadata.clone().map(serde_json::Value::Object);
        sqlx::query(&query)
            .bind(&entry.run_id)
            .bind(&entry.org_id)
            .bind(&entry.module_id)
            .bind(&entry.signature_7d)
            .bind(&entry.model)
            .bind(i64::try_from(entry.tokens).unwrap_or(i64::MAX))
            .bind(entry.cost)
            .bind(entry.verdict.as_str())
            .bind(&entry.export_formats)
            .bind(&entry.content_hash)
            .bind(i64::try_from(entry.duration_ms).unwrap_or(i64::MAX))
            .bind(&entry.error_code)
            .bind(metadata)
            .bind(entry.timestamp)
            .execute(pool)
            .await?;
        Ok(())
    }
}
