//! Postgres-backed implementation of every store trait.

use async_trait::async_trait;
use forgewatch_core::audit::AuditRecord;
use forgewatch_core::incident::IncidentReport;
use forgewatch_core::run_log::RunLogEntry;
use forgewatch_core::security::{SecurityEventRecord, Session};
use forgewatch_core::types::Timestamp;
use serde_json::Value;

use crate::repositories::{
    AuditRecordRepo, IncidentRepo, RunLogRepo, RuntimeFlagRepo, SecurityEventRepo, SessionRepo,
    TelemetryRepo,
};
use crate::store::{
    AuditRecordStore, IncidentStore, RunLogSink, RuntimeFlagStore, SecurityEventStore,
    SessionStore, StoreHealth, TelemetryStore,
};
use crate::{DbPool, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl AuditRecordStore for PgStore {
    async fn last_hash(&self, org_id: &str) -> Result<Option<String>, StoreError> {
        Ok(AuditRecordRepo::find_last_hash(&self.pool, org_id).await?)
    }

    async fn insert(&self, record: &AuditRecord) -> Result<(), StoreError> {
        Ok(AuditRecordRepo::insert(&self.pool, record).await?)
    }

    async fn list_for_org(
        &self,
        org_id: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = AuditRecordRepo::list_for_org(&self.pool, org_id, from, to).await?;
        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }
}

#[async_trait]
impl RunLogSink for PgStore {
    async fn persist(&self, entry: &RunLogEntry) -> Result<(), StoreError> {
        Ok(RunLogRepo::insert(&self.pool, entry).await?)
    }
}

#[async_trait]
impl SecurityEventStore for PgStore {
    async fn insert_event(&self, event: &SecurityEventRecord) -> Result<(), StoreError> {
        Ok(SecurityEventRepo::insert(&self.pool, event).await?)
    }

    async fn list_events(
        &self,
        event_type: &str,
        user_id: Option<&str>,
        since: Timestamp,
    ) -> Result<Vec<SecurityEventRecord>, StoreError> {
        SecurityEventRepo::list_by_type_since(&self.pool, event_type, user_id, since)
            .await?
            .into_iter()
            .map(SecurityEventRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        Ok(SessionRepo::insert(&self.pool, session).await?)
    }

    async fn find_valid(&self, token: &str, now: Timestamp) -> Result<Option<Session>, StoreError> {
        Ok(SessionRepo::find_valid(&self.pool, token, now)
            .await?
            .map(Session::from))
    }

    async fn touch(&self, token: &str, now: Timestamp) -> Result<bool, StoreError> {
        Ok(SessionRepo::touch(&self.pool, token, now).await?)
    }

    async fn deactivate(&self, token: &str, user_id: Option<&str>) -> Result<bool, StoreError> {
        Ok(SessionRepo::deactivate(&self.pool, token, user_id).await?)
    }

    async fn deactivate_all(
        &self,
        user_id: &str,
        except_token: Option<&str>,
    ) -> Result<u64, StoreError> {
        Ok(SessionRepo::deactivate_all(&self.pool, user_id, except_token).await?)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        only_valid_at: Option<Timestamp>,
        limit: Option<i64>,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = SessionRepo::list_for_user(&self.pool, user_id, only_valid_at, limit).await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn deactivate_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        Ok(SessionRepo::deactivate_expired(&self.pool, now).await?)
    }
}

#[async_trait]
impl RuntimeFlagStore for PgStore {
    async fn set_flag(&self, flag: &str, value: bool) -> Result<(), StoreError> {
        Ok(RuntimeFlagRepo::upsert(&self.pool, flag, value).await?)
    }

    async fn get_flag(&self, flag: &str) -> Result<Option<bool>, StoreError> {
        Ok(RuntimeFlagRepo::get(&self.pool, flag).await?)
    }
}

#[async_trait]
impl IncidentStore for PgStore {
    async fn save_incident(&self, incident: &IncidentReport) -> Result<(), StoreError> {
        IncidentRepo::upsert(&self.pool, incident).await
    }

    async fn list_unresolved_incidents(&self) -> Result<Vec<IncidentReport>, StoreError> {
        IncidentRepo::list_unresolved(&self.pool)
            .await?
            .into_iter()
            .map(IncidentReport::try_from)
            .collect()
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn insert_telemetry(
        &self,
        event_name: &str,
        org_id: &str,
        payload: &Value,
        created_at: Timestamp,
    ) -> Result<(), StoreError> {
        TelemetryRepo::insert(&self.pool, event_name, org_id, payload, created_at).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn healthy(&self) -> bool {
        crate::health_check(&self.pool).await.is_ok()
    }
}
