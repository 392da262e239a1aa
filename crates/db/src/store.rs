//! Store traits the monitoring services depend on.
//!
//! Each trait is deliberately narrow: only the queries its service issues.

use async_trait::async_trait;
use forgewatch_core::audit::AuditRecord;
use forgewatch_core::incident::IncidentReport;
use forgewatch_core::run_log::RunLogEntry;
use forgewatch_core::security::{SecurityEventRecord, Session};
use forgewatch_core::types::Timestamp;
use serde_json::Value;

use crate::StoreError;

/// Append-only storage for hash-chained audit records.
#[async_trait]
pub trait AuditRecordStore: Send + Sync {
    /// Hash of the most recently inserted record of `org_id`, if any.
    async fn last_hash(&self, org_id: &str) -> Result<Option<String>, StoreError>;

    async fn insert(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Records of `org_id` in insertion order, optionally bounded by
    /// inclusive creation timestamps.
    async fn list_for_org(
        &self,
        org_id: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Durable sink for run log entries. Callers treat failures as non-fatal.
#[async_trait]
pub trait RunLogSink: Send + Sync {
    async fn persist(&self, entry: &RunLogEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SecurityEventStore: Send + Sync {
    async fn insert_event(&self, event: &SecurityEventRecord) -> Result<(), StoreError>;

    /// Events of `event_type` created at or after `since`, newest first,
    /// optionally restricted to one user.
    async fn list_events(
        &self,
        event_type: &str,
        user_id: Option<&str>,
        since: Timestamp,
    ) -> Result<Vec<SecurityEventRecord>, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Active session with `token` that has not expired at `now`.
    async fn find_valid(&self, token: &str, now: Timestamp) -> Result<Option<Session>, StoreError>;

    /// Set `last_activity` on an active session. Returns whether one matched.
    async fn touch(&self, token: &str, now: Timestamp) -> Result<bool, StoreError>;

    /// Deactivate a session, optionally only if it belongs to `user_id`.
    async fn deactivate(&self, token: &str, user_id: Option<&str>) -> Result<bool, StoreError>;

    /// Deactivate every active session of `user_id` except `except_token`.
    async fn deactivate_all(
        &self,
        user_id: &str,
        except_token: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Sessions of `user_id` ordered by last activity, most recent first.
    async fn list_for_user(
        &self,
        user_id: &str,
        only_valid_at: Option<Timestamp>,
        limit: Option<i64>,
    ) -> Result<Vec<Session>, StoreError>;

    /// Deactivate active sessions whose expiry is before `now`.
    async fn deactivate_expired(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// Shared boolean configuration flags.
#[async_trait]
pub trait RuntimeFlagStore: Send + Sync {
    async fn set_flag(&self, flag: &str, value: bool) -> Result<(), StoreError>;
    async fn get_flag(&self, flag: &str) -> Result<Option<bool>, StoreError>;
}

/// Durable copies of alert incidents, rewritten on every change.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn save_incident(&self, incident: &IncidentReport) -> Result<(), StoreError>;

    /// Incidents not yet resolved, oldest first.
    async fn list_unresolved_incidents(&self) -> Result<Vec<IncidentReport>, StoreError>;
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn insert_telemetry(
        &self,
        event_name: &str,
        org_id: &str,
        payload: &Value,
        created_at: Timestamp,
    ) -> Result<(), StoreError>;
}

/// Liveness probe for whatever backs the stores.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn healthy(&self) -> bool;
}
