//! Security event and user session rows.

use forgewatch_core::security::{SecurityEventRecord, SecuritySeverity, Session};
use forgewatch_core::types::Timestamp;
use sqlx::FromRow;

use crate::StoreError;

// ---------------------------------------------------------------------------
// Security events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct SecurityEventRow {
    pub id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: String,
    pub severity: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
}

impl TryFrom<SecurityEventRow> for SecurityEventRecord {
    type Error = StoreError;

    fn try_from(row: SecurityEventRow) -> Result<Self, Self::Error> {
        let severity: SecuritySeverity = row
            .severity
            .parse()
            .map_err(StoreError::Corrupt)?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            event_type: row.event_type,
            severity,
            description: row.description,
            metadata: row.metadata,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub session_token: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub last_activity: Timestamp,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            session_token: row.session_token,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            is_active: row.is_active,
            last_activity: row.last_activity,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}
