//! Audit trail record types, canonical form and hash-chain verification.
//!
//! Every record is signed with HMAC-SHA256 over a canonical JSON rendering
//! of its content plus the hash of the previous record of the same
//! organization. Chains are strictly per organization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Entity type and action constants
// ---------------------------------------------------------------------------

/// Entity types written by the convenience wrappers.
pub mod entity_types {
    pub const SECURITY_EVENT: &str = "security_event";
    pub const AUTHENTICATION: &str = "authentication";
    pub const EXPORT: &str = "export";
    pub const API_ACCESS: &str = "api_access";
    pub const RUNTIME_FLAG: &str = "runtime_flag";
}

/// Actions written by the convenience wrappers.
pub mod actions {
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const MFA_SETUP: &str = "mfa_setup";
    pub const PASSWORD_RESET: &str = "password_reset";
    pub const EXPORT_PERFORMED: &str = "export_performed";
    pub const API_CALL: &str = "api_call";
    pub const AGENTS_REENABLED: &str = "agents_reenabled";
    pub const AGENTS_DISABLED: &str = "agents_disabled";
    pub const DEGRADATION_ENABLED: &str = "degradation_enabled";
    pub const DEGRADATION_DISABLED: &str = "degradation_disabled";
}

/// Value of the `source` metadata key for records written by the security
/// middleware wrappers.
pub const MIDDLEWARE_SOURCE: &str = "middleware";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A record as submitted by a caller, before chaining.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub org_id: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub record_json: Value,
    #[serde(default)]
    pub metadata: Value,
}

/// A persisted, chained audit record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub org_id: String,
    pub actor_id: Option<String>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub record_json: Value,
    /// Hash of the preceding record of the same organization; empty for the
    /// first record of a chain.
    pub prev_hash: String,
    pub hash: String,
    pub metadata: Value,
    pub created_at: Timestamp,
}

impl AuditRecord {
    /// Chain `new` onto `prev_hash`, signing it with `secret`.
    pub fn chain(
        id: String,
        new: NewAuditRecord,
        prev_hash: String,
        secret: &[u8],
        created_at: Timestamp,
    ) -> Self {
        let hash = compute_record_hash(secret, &CanonicalFields::from(&new), &prev_hash);
        Self {
            id,
            org_id: new.org_id,
            actor_id: new.actor_id,
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            action: new.action,
            record_json: new.record_json,
            prev_hash,
            hash,
            metadata: new.metadata,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical form
// ---------------------------------------------------------------------------

/// Borrowed view of the hashed fields of a record.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalFields<'a> {
    pub org_id: &'a str,
    pub actor_id: Option<&'a str>,
    pub entity_type: &'a str,
    pub entity_id: Option<&'a str>,
    pub action: &'a str,
    pub record_json: &'a Value,
    pub metadata: &'a Value,
}

impl<'a> From<&'a NewAuditRecord> for CanonicalFields<'a> {
    fn from(r: &'a NewAuditRecord) -> Self {
        Self {
            org_id: &r.org_id,
            actor_id: r.actor_id.as_deref(),
            entity_type: &r.entity_type,
            entity_id: r.entity_id.as_deref(),
            action: &r.action,
            record_json: &r.record_json,
            metadata: &r.metadata,
        }
    }
}

impl<'a> From<&'a AuditRecord> for CanonicalFields<'a> {
    fn from(r: &'a AuditRecord) -> Self {
        Self {
            org_id: &r.org_id,
            actor_id: r.actor_id.as_deref(),
            entity_type: &r.entity_type,
            entity_id: r.entity_id.as_deref(),
            action: &r.action,
            record_json: &r.record_json,
            metadata: &r.metadata,
        }
    }
}

/// Field order of this struct is the canonical key order.
#[derive(Serialize)]
struct Canonical<'a> {
    org_id: &'a str,
    actor_id: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    action: &'a str,
    record_json: &'a Value,
    prev_hash: &'a str,
    metadata: &'a Value,
}

/// Render the canonical JSON string that is signed for a record.
///
/// Keys appear in a fixed order. Absent strings render as `""` and absent
/// (null) objects as `{}`. Nested object keys are sorted by `serde_json`.
pub fn canonical_string(fields: &CanonicalFields<'_>, prev_hash: &str) -> String {
    let empty = Value::Object(serde_json::Map::new());
    let canonical = Canonical {
        org_id: fields.org_id,
        actor_id: fields.actor_id.unwrap_or(""),
        entity_type: fields.entity_type,
        entity_id: fields.entity_id.unwrap_or(""),
        action: fields.action,
        record_json: or_empty(fields.record_json, &empty),
        prev_hash,
        metadata: or_empty(fields.metadata, &empty),
    };
    serde_json::to_string(&canonical).expect("canonical audit fields always serialize")
}

fn or_empty<'v>(value: &'v Value, empty: &'v Value) -> &'v Value {
    if value.is_null() {
        empty
    } else {
        value
    }
}

/// HMAC-SHA256 of the canonical form, hex encoded.
pub fn compute_record_hash(secret: &[u8], fields: &CanonicalFields<'_>, prev_hash: &str) -> String {
    hashing::hmac_sha256_hex(secret, canonical_string(fields, prev_hash).as_bytes())
}

// ---------------------------------------------------------------------------
// Chain verification
// ---------------------------------------------------------------------------

/// A record whose stored hash does not match its recomputed hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenRecord {
    pub id: String,
    pub expected_hash: String,
    pub actual_hash: String,
}

/// Outcome of verifying one organization's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub verified_records: usize,
    pub broken_records: Vec<BrokenRecord>,
}

/// Verify a chain given its records in creation order.
///
/// Each record is recomputed against the *stored* hash of its predecessor,
/// so a tampered record is flagged without cascading through the rest of
/// the chain. A tampered `hash` column also flags the following record.
pub fn verify_chain(secret: &[u8], records: &[AuditRecord]) -> ChainVerification {
    let mut prev_hash = "";
    let mut broken_records = Vec::new();

    for record in records {
        let expected = compute_record_hash(secret, &CanonicalFields::from(record), prev_hash);
        if !hashing::constant_time_eq(&expected, &record.hash) {
            broken_records.push(BrokenRecord {
                id: record.id.clone(),
                expected_hash: expected,
                actual_hash: record.hash.clone(),
            });
        }
        prev_hash = &record.hash;
    }

    ChainVerification {
        is_valid: broken_records.is_empty(),
        verified_records: records.len(),
        broken_records,
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Supported export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Column order of the CSV export.
pub const CSV_COLUMNS: &[&str] = &[
    "id",
    "org_id",
    "actor_id",
    "entity_type",
    "entity_id",
    "action",
    "created_at",
    "hash",
];

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Render records as CSV with a header row. Every data cell is quoted.
pub fn to_csv(records: &[AuditRecord]) -> String {
    let mut rows = vec![CSV_COLUMNS.join(",")];
    for r in records {
        let created_at = r.created_at.to_rfc3339();
        let cells = [
            r.id.as_str(),
            r.org_id.as_str(),
            r.actor_id.as_deref().unwrap_or(""),
            r.entity_type.as_str(),
            r.entity_id.as_deref().unwrap_or(""),
            r.action.as_str(),
            created_at.as_str(),
            r.hash.as_str(),
        ];
        rows.push(cells.map(csv_cell).join(","));
    }
    rows.join("\n")
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// Calendar date (UTC) formatted as `YYYY-MM-DD`.
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub events_by_action: BTreeMap<String, usize>,
    /// Per-day counts sorted by date ascending.
    pub recent_activity: Vec<DailyCount>,
}

pub fn compute_audit_statistics(records: &[AuditRecord]) -> AuditStatistics {
    let mut stats = AuditStatistics {
        total_events: records.len(),
        ..Default::default()
    };
    let mut by_day: BTreeMap<String, usize> = BTreeMap::new();

    for r in records {
        *stats.events_by_type.entry(r.entity_type.clone()).or_default() += 1;
        *stats.events_by_action.entry(r.action.clone()).or_default() += 1;
        *by_day
            .entry(r.created_at.format("%Y-%m-%d").to_string())
            .or_default() += 1;
    }

    stats.recent_activity = by_day
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect();
    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
