//! Tamper-evident audit trail.
//!
//! Each organization has its own chain: a record's `prev_hash` is the hash
//! of the organization's previous record and its own hash is an HMAC over
//! the canonical form. Inserts for one organization are serialized so two
//! concurrent writers never chain onto the same predecessor.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use forgewatch_core::audit::{
    actions, compute_audit_statistics, entity_types, to_csv, verify_chain, AuditRecord,
    AuditStatistics, ChainVerification, ExportFormat, NewAuditRecord, MIDDLEWARE_SOURCE,
};
use forgewatch_core::error::CoreError;
use forgewatch_core::security::SecuritySeverity;
use forgewatch_core::types::{new_id, Timestamp, SYSTEM_ORG};
use forgewatch_db::store::AuditRecordStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::error::MonitorError;

const AUTH_SOURCE: &str = "auth_system";
const EXPORT_SOURCE: &str = "export_system";
const API_SOURCE: &str = "api_middleware";
const ADMIN_SOURCE: &str = "admin_api";

/// Widest window accepted by [`AuditTrail::audit_statistics`].
pub const MAX_STATISTICS_DAYS: i64 = 3650;

/// A security event observed by request middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAuditEvent {
    /// e.g. `honeypot_access`, `injection_attempt`, `rate_limit_exceeded`.
    pub event_type: String,
    pub severity: SecuritySeverity,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    Login,
    Logout,
    MfaSetup,
    PasswordReset,
}

impl AuthAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => actions::LOGIN,
            Self::Logout => actions::LOGOUT,
            Self::MfaSetup => actions::MFA_SETUP,
            Self::PasswordReset => actions::PASSWORD_RESET,
        }
    }
}

fn metadata(source: &str, now: Timestamp) -> Value {
    json!({ "timestamp": now.to_rfc3339(), "source": source })
}

/// `base` with the keys of `details` merged over it when it is an object.
fn merge_details(mut base: Map<String, Value>, details: Value) -> Value {
    if let Value::Object(extra) = details {
        base.extend(extra);
    }
    Value::Object(base)
}

pub struct AuditTrail {
    store: Arc<dyn AuditRecordStore>,
    secret: Vec<u8>,
    org_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditRecordStore>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            store,
            secret: secret.into(),
            org_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn org_lock(&self, org_id: &str) -> Arc<Mutex<()>> {
        self.org_locks
            .lock()
            .await
            .entry(org_id.to_string())
            .or_default()
            .clone()
    }

    // -----------------------------------------------------------------------
    // Core chain operations
    // -----------------------------------------------------------------------

    /// Chain and persist a record, returning its id. Store failures
    /// propagate to the caller.
    pub async fn insert_audit_record(&self, record: NewAuditRecord) -> Result<String, MonitorError> {
        if record.org_id.trim().is_empty() {
            return Err(CoreError::Validation("org_id is required".into()).into());
        }
        if record.entity_type.trim().is_empty() || record.action.trim().is_empty() {
            return Err(CoreError::Validation("entity_type and action are required".into()).into());
        }

        let lock = self.org_lock(&record.org_id).await;
        let _guard = lock.lock().await;

        let prev_hash = self.store.last_hash(&record.org_id).await?.unwrap_or_default();
        let chained = AuditRecord::chain(new_id(), record, prev_hash, &self.secret, Utc::now());
        self.store.insert(&chained).await.inspect_err(|e| {
            tracing::error!(error = %e, org_id = %chained.org_id, "Audit record insert failed");
        })?;

        tracing::debug!(
            id = %chained.id,
            org_id = %chained.org_id,
            action = %chained.action,
            "Audit record chained"
        );
        Ok(chained.id)
    }

    /// Recompute every hash of an organization's chain. Never repairs.
    pub async fn verify_audit_chain(&self, org_id: &str) -> Result<ChainVerification, MonitorError> {
        let records = self.store.list_for_org(org_id, None, None).await?;
        let verification = verify_chain(&self.secret, &records);
        if !verification.is_valid {
            tracing::warn!(
                org_id,
                broken = verification.broken_records.len(),
                "Audit chain verification found broken records"
            );
        }
        Ok(verification)
    }

    // -----------------------------------------------------------------------
    // Convenience wrappers
    // -----------------------------------------------------------------------

    pub async fn log_security_event(
        &self,
        event: SecurityAuditEvent,
    ) -> Result<String, MonitorError> {
        let record = NewAuditRecord {
            org_id: SYSTEM_ORG.to_string(),
            entity_type: entity_types::SECURITY_EVENT.to_string(),
            action: event.event_type,
            record_json: json!({
                "severity": event.severity,
                "details": event.details,
                "ip_address": event.ip_address,
                "user_agent": event.user_agent,
                "path": event.path,
                "method": event.method,
            }),
            metadata: metadata(MIDDLEWARE_SOURCE, Utc::now()),
            ..Default::default()
        };
        self.insert_audit_record(record).await
    }

    pub async fn log_authentication(
        &self,
        org_id: &str,
        user_id: &str,
        action: AuthAction,
        details: Value,
    ) -> Result<String, MonitorError> {
        let record = NewAuditRecord {
            org_id: org_id.to_string(),
            actor_id: Some(user_id.to_string()),
            entity_type: entity_types::AUTHENTICATION.to_string(),
            action: action.as_str().to_string(),
            record_json: merge_details(Map::new(), details),
            metadata: metadata(AUTH_SOURCE, Utc::now()),
            ..Default::default()
        };
        self.insert_audit_record(record).await
    }

    pub async fn log_export(
        &self,
        org_id: &str,
        user_id: &str,
        export_id: &str,
        format: &str,
        score: f64,
        details: Value,
    ) -> Result<String, MonitorError> {
        let mut base = Map::new();
        base.insert("format".into(), json!(format));
        base.insert("score".into(), json!(score));

        let record = NewAuditRecord {
            org_id: org_id.to_string(),
            actor_id: Some(user_id.to_string()),
            entity_type: entity_types::EXPORT.to_string(),
            entity_id: Some(export_id.to_string()),
            action: actions::EXPORT_PERFORMED.to_string(),
            record_json: merge_details(base, details),
            metadata: metadata(EXPORT_SOURCE, Utc::now()),
        };
        self.insert_audit_record(record).await
    }

    pub async fn log_api_access(
        &self,
        org_id: &str,
        user_id: &str,
        endpoint: &str,
        method: &str,
        status_code: u16,
        details: Value,
    ) -> Result<String, MonitorError> {
        let mut base = Map::new();
        base.insert("endpoint".into(), json!(endpoint));
        base.insert("method".into(), json!(method));
        base.insert("status_code".into(), json!(status_code));

        let record = NewAuditRecord {
            org_id: org_id.to_string(),
            actor_id: Some(user_id.to_string()),
            entity_type: entity_types::API_ACCESS.to_string(),
            action: actions::API_CALL.to_string(),
            record_json: merge_details(base, details),
            metadata: metadata(API_SOURCE, Utc::now()),
            ..Default::default()
        };
        self.insert_audit_record(record).await
    }

    /// Record an operator clearing the kill-switch.
    pub async fn log_agents_reenabled(
        &self,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<String, MonitorError> {
        let record = NewAuditRecord {
            org_id: SYSTEM_ORG.to_string(),
            actor_id: Some(actor.to_string()),
            entity_type: entity_types::RUNTIME_FLAG.to_string(),
            entity_id: Some(crate::flags::AGENTS_ENABLED.to_string()),
            action: actions::AGENTS_REENABLED.to_string(),
            record_json: json!({ "value": true, "reason": reason }),
            metadata: metadata(ADMIN_SOURCE, Utc::now()),
        };
        self.insert_audit_record(record).await
    }

    /// Record an operator tripping the kill-switch.
    pub async fn log_agents_disabled(
        &self,
        actor: &str,
        reason: &str,
    ) -> Result<String, MonitorError> {
        let record = NewAuditRecord {
            org_id: SYSTEM_ORG.to_string(),
            actor_id: Some(actor.to_string()),
            entity_type: entity_types::RUNTIME_FLAG.to_string(),
            entity_id: Some(crate::flags::AGENTS_ENABLED.to_string()),
            action: actions::AGENTS_DISABLED.to_string(),
            record_json: json!({ "value": false, "reason": reason }),
            metadata: metadata(ADMIN_SOURCE, Utc::now()),
        };
        self.insert_audit_record(record).await
    }

    /// Record an operator switching degradation mode on or off.
    pub async fn log_degradation_changed(
        &self,
        actor: &str,
        enabled: bool,
    ) -> Result<String, MonitorError> {
        let action = if enabled {
            actions::DEGRADATION_ENABLED
        } else {
            actions::DEGRADATION_DISABLED
        };
        let record = NewAuditRecord {
            org_id: SYSTEM_ORG.to_string(),
            actor_id: Some(actor.to_string()),
            entity_type: entity_types::RUNTIME_FLAG.to_string(),
            entity_id: Some(crate::flags::DEGRADE_TO_SIMULATION.to_string()),
            action: action.to_string(),
            record_json: json!({ "value": enabled }),
            metadata: metadata(ADMIN_SOURCE, Utc::now()),
        };
        self.insert_audit_record(record).await
    }

    // -----------------------------------------------------------------------
    // Export and statistics
    // -----------------------------------------------------------------------

    /// Render an organization's records, oldest first, in `format`.
    pub async fn export_audit_logs(
        &self,
        org_id: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
        format: ExportFormat,
    ) -> Result<String, MonitorError> {
        let records = self.store.list_for_org(org_id, from, to).await?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&records)
                .map_err(|e| CoreError::Internal(e.to_string()))?),
            ExportFormat::Csv => Ok(to_csv(&records)),
        }
    }

    /// Counts over the last `days` days, clamped to
    /// `1..=MAX_STATISTICS_DAYS`.
    pub async fn audit_statistics(
        &self,
        org_id: &str,
        days: i64,
    ) -> Result<AuditStatistics, MonitorError> {
        let since = Utc::now() - Duration::days(days.clamp(1, MAX_STATISTICS_DAYS));
        let records = self.store.list_for_org(org_id, Some(since), None).await?;
        Ok(compute_audit_statistics(&records))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
