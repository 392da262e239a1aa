//! Audit record rows. No `updated_at`: rows are immutable.

use forgewatch_core::audit::AuditRecord;
use forgewatch_core::types::Timestamp;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct AuditRecordRow {
    pub seq: i64,
    pub id: String,
    pub org_id: String,
    pub actor_id: Option<String>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub record_json: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

impl From<AuditRecordRow> for AuditRecord {
    fn from(row: AuditRecordRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            actor_id: row.actor_id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action: row.action,
            record_json: row.record_json,
            prev_hash: row.prev_hash,
            hash: row.hash,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}
