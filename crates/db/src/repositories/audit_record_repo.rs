//! Repository for the append-only `audit_records` table.

use forgewatch_core::audit::AuditRecord;
use forgewatch_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::audit::AuditRecordRow;

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `audit_records` SELECT queries.
const COLUMNS: &str = "\
    seq, id, org_id, actor_id, entity_type, entity_id, action, \
    record_json, prev_hash, hash, metadata, created_at";

/// Column list for INSERT (excludes the generated `seq`).
const INSERT_COLUMNS: &str = "\
    id, org_id, actor_id, entity_type, entity_id, action, \
    record_json, prev_hash, hash, metadata, created_at";

// ---------------------------------------------------------------------------
// AuditRecordRepo
// ---------------------------------------------------------------------------

pub struct AuditRecordRepo;

impl AuditRecordRepo {
    /// Hash of the most recently inserted record of an organization.
    pub async fn find_last_hash(pool: &PgPool, org_id: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT hash FROM audit_records WHERE org_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(org_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn insert(pool: &PgPool, record: &AuditRecord) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_records ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        sqlx::query(&query)
            .bind(&record.id)
            .bind(&record.org_id)
            .bind(&record.actor_id)
            .bind(&record.entity_type)
            .bind(&record.entity_id)
            .bind(&record.action)
            .bind(&record.record_json)
            .bind(&record.prev_hash)
            .bind(&record.hash)
            .bind(&record.metadata)
            .bind(record.created_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// All records of an organization in insertion order, optionally bounded
    /// by inclusive creation timestamps.
    pub async fn list_for_org(
        pool: &PgPool,
        org_id: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<AuditRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_records \
             WHERE org_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND ($3::timestamptz IS NULL OR created_at <= $3) \
             ORDER BY seq ASC"
        );
        sqlx::query_as::<_, AuditRecordRow>(&query)
            .bind(org_id)
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }
}
