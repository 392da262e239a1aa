//! In-memory implementation of every store trait.
//!
//! Used by tests and by deployments started without `DATABASE_URL`. Data is
//! lost on restart. [`MemoryStore::set_unavailable`] makes every call fail,
//! which lets callers exercise their store-error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use forgewatch_core::audit::AuditRecord;
use forgewatch_core::incident::{IncidentReport, IncidentStatus};
use forgewatch_core::run_log::RunLogEntry;
use forgewatch_core::security::{SecurityEventRecord, Session};
use forgewatch_core::types::Timestamp;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{
    AuditRecordStore, IncidentStore, RunLogSink, RuntimeFlagStore, SecurityEventStore,
    SessionStore, StoreHealth, TelemetryStore,
};
use crate::StoreError;

/// A telemetry row as captured by the in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTelemetry {
    pub event_name: String,
    pub org_id: String,
    pub payload: Value,
    pub created_at: Timestamp,
}

#[derive(Default)]
pub struct MemoryStore {
    audit: RwLock<Vec<AuditRecord>>,
    run_logs: RwLock<Vec<RunLogEntry>>,
    security_events: RwLock<Vec<SecurityEventRecord>>,
    sessions: RwLock<Vec<Session>>,
    flags: RwLock<HashMap<String, bool>>,
    incidents: RwLock<Vec<IncidentReport>>,
    telemetry: RwLock<Vec<StoredTelemetry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".into()));
        }
        Ok(())
    }

    /// Direct mutable access to stored audit records, for tamper tests.
    pub async fn with_audit_records<R>(&self, f: impl FnOnce(&mut Vec<AuditRecord>) -> R) -> R {
        let mut guard = self.audit.write().await;
        f(&mut *guard)
    }

    pub async fn persisted_run_logs(&self) -> Vec<RunLogEntry> {
        self.run_logs.read().await.clone()
    }

    pub async fn telemetry_events(&self) -> Vec<StoredTelemetry> {
        self.telemetry.read().await.clone()
    }

    pub async fn stored_incidents(&self) -> Vec<IncidentReport> {
        self.incidents.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Audit records
// ---------------------------------------------------------------------------

#[async_trait]
impl AuditRecordStore for MemoryStore {
    async fn last_hash(&self, org_id: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.org_id == org_id)
            .map(|r| r.hash.clone()))
    }

    async fn insert(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.check()?;
        self.audit.write().await.push(record.clone());
        Ok(())
    }

    async fn list_for_org(
        &self,
        org_id: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        self.check()?;
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .filter(|r| r.org_id == org_id)
            .filter(|r| from.is_none_or(|f| r.created_at >= f))
            .filter(|r| to.is_none_or(|t| r.created_at <= t))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Run logs
// ---------------------------------------------------------------------------

#[async_trait]
impl RunLogSink for MemoryStore {
    async fn persist(&self, entry: &RunLogEntry) -> Result<(), StoreError> {
        self.check()?;
        self.run_logs.write().await.push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Security events
// ---------------------------------------------------------------------------

#[async_trait]
impl SecurityEventStore for MemoryStore {
    async fn insert_event(&self, event: &SecurityEventRecord) -> Result<(), StoreError> {
        self.check()?;
        self.security_events.write().await.push(event.clone());
        Ok(())
    }

    async fn list_events(
        &self,
        event_type: &str,
        user_id: Option<&str>,
        since: Timestamp,
    ) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.check()?;
        let mut events: Vec<SecurityEventRecord> = self
            .security_events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type && e.created_at >= since)
            .filter(|e| user_id.is_none_or(|u| e.user_id.as_deref() == Some(u)))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.check()?;
        self.sessions.write().await.push(session.clone());
        Ok(())
    }

    async fn find_valid(&self, token: &str, now: Timestamp) -> Result<Option<Session>, StoreError> {
        self.check()?;
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .find(|s| s.session_token == token && s.is_valid(now))
            .cloned())
    }

    async fn touch(&self, token: &str, now: Timestamp) -> Result<bool, StoreError> {
        self.check()?;
        let mut sessions = self.sessions.write().await;
        match sessions
            .iter_mut()
            .find(|s| s.session_token == token && s.is_active)
        {
            Some(s) => {
                s.last_activity = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate(&self, token: &str, user_id: Option<&str>) -> Result<bool, StoreError> {
        self.check()?;
        let mut sessions = self.sessions.write().await;
        let mut matched = false;
        for s in sessions.iter_mut().filter(|s| {
            s.session_token == token && user_id.is_none_or(|u| s.user_id == u)
        }) {
            s.is_active = false;
            matched = true;
        }
        Ok(matched)
    }

    async fn deactivate_all(
        &self,
        user_id: &str,
        except_token: Option<&str>,
    ) -> Result<u64, StoreError> {
        self.check()?;
        let mut sessions = self.sessions.write().await;
        let mut count = 0;
        for s in sessions.iter_mut().filter(|s| {
            s.user_id == user_id && s.is_active && except_token != Some(s.session_token.as_str())
        }) {
            s.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        only_valid_at: Option<Timestamp>,
        limit: Option<i64>,
    ) -> Result<Vec<Session>, StoreError> {
        self.check()?;
        let mut out: Vec<Session> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter(|s| only_valid_at.is_none_or(|now| s.is_valid(now)))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        if let Some(limit) = limit.and_then(|l| usize::try_from(l).ok()) {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn deactivate_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        self.check()?;
        let mut sessions = self.sessions.write().await;
        let mut count = 0;
        for s in sessions
            .iter_mut()
            .filter(|s| s.is_active && s.expires_at < now)
        {
            s.is_active = false;
            count += 1;
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Runtime flags, incidents and telemetry
// ---------------------------------------------------------------------------

#[async_trait]
impl RuntimeFlagStore for MemoryStore {
    async fn set_flag(&self, flag: &str, value: bool) -> Result<(), StoreError> {
        self.check()?;
        self.flags.write().await.insert(flag.to_string(), value);
        Ok(())
    }

    async fn get_flag(&self, flag: &str) -> Result<Option<bool>, StoreError> {
        self.check()?;
        Ok(self.flags.read().await.get(flag).copied())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn save_incident(&self, incident: &IncidentReport) -> Result<(), StoreError> {
        self.check()?;
        let mut incidents = self.incidents.write().await;
        match incidents.iter_mut().find(|i| i.id == incident.id) {
            Some(stored) => *stored = incident.clone(),
            None => incidents.push(incident.clone()),
        }
        Ok(())
    }

    async fn list_unresolved_incidents(&self) -> Result<Vec<IncidentReport>, StoreError> {
        self.check()?;
        let mut out: Vec<IncidentReport> = self
            .incidents
            .read()
            .await
            .iter()
            .filter(|i| i.status != IncidentStatus::Resolved)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(out)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn insert_telemetry(
        &self,
        event_name: &str,
        org_id: &str,
        payload: &Value,
        created_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.telemetry.write().await.push(StoredTelemetry {
            event_name: event_name.to_string(),
            org_id: org_id.to_string(),
            payload: payload.clone(),
            created_at,
        });
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn healthy(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
