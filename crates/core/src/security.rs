//! Auth-side security model: events, the rule engine that flags anomalous
//! ones, persisted security events and user sessions.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hashing;
use crate::types::{new_id, Timestamp};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecuritySeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown security severity: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth events
// ---------------------------------------------------------------------------

/// Event type constants understood by the default rules.
pub mod event_types {
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const CONCURRENT_SESSION: &str = "concurrent_session";
    pub const API_REQUEST: &str = "api_request";
    pub const MFA_FAILED: &str = "mfa_failed";
    pub const ANOMALY_DETECTED: &str = "anomaly_detected";
}

/// An authentication-layer event submitted for analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub user_id: String,
    pub event_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AuthEvent {
    /// Look up a rule field: the well-known event fields first, then metadata.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "event_type" => Some(Value::String(self.event_type.clone())),
            "ip_address" => self.ip_address.clone().map(Value::String),
            "user_agent" => self.user_agent.clone().map(Value::String),
            other => self.metadata.get(other).cloned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RuleCondition {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    pub fn matches(&self, event: &AuthEvent) -> bool {
        let actual = event.field(&self.field);
        match self.operator {
            ConditionOperator::Equals => actual.as_ref() == Some(&self.value),
            ConditionOperator::NotEquals => actual.as_ref() != Some(&self.value),
            ConditionOperator::GreaterThan => match (actual.as_ref().and_then(as_number), as_number(&self.value)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            ConditionOperator::LessThan => match (actual.as_ref().and_then(as_number), as_number(&self.value)) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            ConditionOperator::Contains => actual
                .as_ref()
                .is_some_and(|a| as_text(a).contains(&as_text(&self.value))),
            ConditionOperator::In => match (&actual, self.value.as_array()) {
                (Some(a), Some(list)) => list.contains(a),
                _ => false,
            },
            ConditionOperator::NotIn => match self.value.as_array() {
                Some(list) => actual.as_ref().is_none_or(|a| !list.contains(a)),
                None => false,
            },
        }
    }
}

/// Side effects run when a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Persist a `security_events` row.
    Log,
    /// Raise an operator-facing security alert.
    Alert,
    /// Block the user at the rate limiter for the given number of minutes.
    Block { minutes: i64 },
    /// Flag the user for step-up authentication.
    RequireMfa,
    /// Notify the listed channels.
    Notify { channels: Vec<String> },
}

/// Counting window for rate-style rules: the rule fires once `threshold`
/// matching events from the same user fall within `minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub minutes: i64,
    pub threshold: usize,
}

impl RateWindow {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: SecuritySeverity,
    pub enabled: bool,
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub window: Option<RateWindow>,
    pub actions: Vec<RuleAction>,
}

impl SecurityRule {
    /// All conditions hold for `event`. Windowed counting is the caller's job.
    pub fn matches(&self, event: &AuthEvent) -> bool {
        self.conditions.iter().all(|c| c.matches(event))
    }
}

pub fn default_security_rules() -> Vec<SecurityRule> {
    use serde_json::json;
    use ConditionOperator::Equals;

    let event_is = |t: &str| RuleCondition::new("event_type", Equals, json!(t));

    vec![
        SecurityRule {
            id: "multiple_failed_logins".into(),
            name: "Multiple Failed Login Attempts".into(),
            description: "Detect multiple failed login attempts from same IP".into(),
            severity: SecuritySeverity::High,
            enabled: true,
            conditions: vec![event_is(event_types::LOGIN_FAILED)],
            window: Some(RateWindow { minutes: 15, threshold: 5 }),
            actions: vec![RuleAction::Log, RuleAction::Alert, RuleAction::Block { minutes: 60 }],
        },
        SecurityRule {
            id: "unusual_location".into(),
            name: "Unusual Login Location".into(),
            description: "Detect login from unusual geographic location".into(),
            severity: SecuritySeverity::Medium,
            enabled: true,
            conditions: vec![
                event_is(event_types::LOGIN_SUCCESS),
                RuleCondition::new("new_location", Equals, json!(true)),
            ],
            window: None,
            actions: vec![RuleAction::Log, RuleAction::RequireMfa],
        },
        SecurityRule {
            id: "concurrent_sessions".into(),
            name: "Excessive Concurrent Sessions".into(),
            description: "Detect too many concurrent sessions for user".into(),
            severity: SecuritySeverity::Medium,
            enabled: true,
            conditions: vec![event_is(event_types::CONCURRENT_SESSION)],
            window: None,
            actions: vec![RuleAction::Log, RuleAction::Alert],
        },
        SecurityRule {
            id: "rapid_api_calls".into(),
            name: "Rapid API Calls".into(),
            description: "Detect unusually high API call frequency".into(),
            severity: SecuritySeverity::Medium,
            enabled: true,
            conditions: vec![event_is(event_types::API_REQUEST)],
            window: Some(RateWindow { minutes: 5, threshold: 100 }),
            actions: vec![RuleAction::Log, RuleAction::Alert],
        },
        SecurityRule {
            id: "mfa_bypass_attempts".into(),
            name: "MFA Bypass Attempts".into(),
            description: "Detect attempts to bypass MFA".into(),
            severity: SecuritySeverity::Critical,
            enabled: true,
            conditions: vec![event_is(event_types::MFA_FAILED)],
            window: None,
            actions: vec![
                RuleAction::Log,
                RuleAction::Block { minutes: 300 },
                RuleAction::Notify {
                    channels: vec!["email".into(), "admin".into()],
                },
            ],
        },
    ]
}

// ---------------------------------------------------------------------------
// Detected anomalies and persisted events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAnomaly {
    pub id: String,
    pub rule_id: String,
    pub user_id: String,
    pub severity: SecuritySeverity,
    pub description: String,
    pub metadata: Value,
    pub detected_at: Timestamp,
    pub resolved: bool,
}

impl DetectedAnomaly {
    pub fn new(rule: &SecurityRule, event: &AuthEvent, now: Timestamp) -> Self {
        let mut metadata = event.metadata.clone();
        metadata.insert("ip_address".into(), event.ip_address.clone().into());
        metadata.insert("user_agent".into(), event.user_agent.clone().into());
        metadata.insert("rule_id".into(), rule.id.clone().into());
        metadata.insert("rule_name".into(), rule.name.clone().into());

        Self {
            id: format!("anomaly_{}_{}", now.timestamp_millis(), hashing::random_hex(4)),
            rule_id: rule.id.clone(),
            user_id: event.user_id.clone(),
            severity: rule.severity,
            description: rule.description.clone(),
            metadata: Value::Object(metadata),
            detected_at: now,
            resolved: false,
        }
    }

    /// Rebuild an anomaly from its persisted `anomaly_detected` event.
    pub fn from_event(event: &SecurityEventRecord) -> Self {
        Self {
            id: event.id.clone(),
            rule_id: event
                .metadata
                .get("rule_id")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            user_id: event.user_id.clone().unwrap_or_default(),
            severity: event.severity,
            description: event.description.clone(),
            metadata: event.metadata.clone(),
            detected_at: event.created_at,
            resolved: false,
        }
    }
}

/// A row of the security event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEventRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: String,
    pub severity: SecuritySeverity,
    pub description: String,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
}

/// Severity recorded for an incoming auth event of `event_type`.
pub fn event_severity(event_type: &str) -> SecuritySeverity {
    if event_type.ends_with("_failed") {
        SecuritySeverity::Medium
    } else {
        SecuritySeverity::Low
    }
}

impl SecurityEventRecord {
    /// The log row for an incoming auth event. Windowed rules count these.
    pub fn from_auth_event(event: &AuthEvent, now: Timestamp) -> Self {
        Self {
            id: new_id(),
            user_id: Some(event.user_id.clone()),
            session_id: event.session_id.clone(),
            event_type: event.event_type.clone(),
            severity: event_severity(&event.event_type),
            description: event.event_type.replace('_', " "),
            metadata: Value::Object(event.metadata.clone()),
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            created_at: now,
        }
    }

    pub fn from_anomaly(anomaly: &DetectedAnomaly, event: &AuthEvent) -> Self {
        Self {
            id: new_id(),
            user_id: Some(anomaly.user_id.clone()),
            session_id: event.session_id.clone(),
            event_type: event_types::ANOMALY_DETECTED.to_string(),
            severity: anomaly.severity,
            description: format!("Anomaly detected: {}", anomaly.description),
            metadata: anomaly.metadata.clone(),
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            created_at: anomaly.detected_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyStats {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub recent: Vec<DetectedAnomaly>,
}

/// Number of anomalies listed in [`AnomalyStats::recent`].
pub const RECENT_ANOMALIES: usize = 10;

/// Aggregate `anomaly_detected` events. Input must be newest first.
pub fn compute_anomaly_stats(events: &[SecurityEventRecord]) -> AnomalyStats {
    let mut by_severity = BTreeMap::new();
    for e in events {
        *by_severity.entry(e.severity.to_string()).or_default() += 1;
    }
    AnomalyStats {
        total: events.len(),
        by_severity,
        recent: events
            .iter()
            .take(RECENT_ANOMALIES)
            .map(DetectedAnomaly::from_event)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Lifetime of a new session.
pub fn session_ttl() -> Duration {
    Duration::days(7)
}

/// Random bytes in a session token (hex encoded to twice the length).
pub const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
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

impl Session {
    pub fn new(
        user_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            session_token: hashing::random_hex(SESSION_TOKEN_BYTES),
            ip_address,
            user_agent,
            is_active: true,
            last_activity: now,
            created_at: now,
            expires_at: now + session_ttl(),
        }
    }

    /// Active and not yet expired. A session expiring exactly at `now` is
    /// still valid.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.is_active && self.expires_at >= now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 8, 20, 16, 0, 0).unwrap()
    }

    fn event(event_type: &str, metadata: Value) -> AuthEvent {
        AuthEvent {
            user_id: "u1".into(),
            event_type: event_type.into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("curl/8".into()),
            session_id: None,
        }
    }

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> RuleCondition {
        RuleCondition::new(field, operator, value)
    }

    // -----------------------------------------------------------------------
    // Conditions
    // -----------------------------------------------------------------------

    #[test]
    fn field_lookup_prefers_event_fields() {
        let e = event("login_failed", json!({"ip_address": "spoofed", "attempts": 3}));
        assert_eq!(e.field("ip_address"), Some(json!("10.0.0.1")));
        assert_eq!(e.field("attempts"), Some(json!(3)));
        assert_eq!(e.field("missing"), None);
    }

    #[test]
    fn equality_operators() {
        let e = event("login_failed", json!({}));
        assert!(cond("event_type", ConditionOperator::Equals, json!("login_failed")).matches(&e));
        assert!(!cond("event_type", ConditionOperator::NotEquals, json!("login_failed")).matches(&e));
        assert!(cond("missing", ConditionOperator::NotEquals, json!("x")).matches(&e));
    }

    #[test]
    fn numeric_operators_coerce_strings() {
        let e = event("x", json!({"attempts": "7", "risk": 0.2}));
        assert!(cond("attempts", ConditionOperator::GreaterThan, json!(5)).matches(&e));
        assert!(cond("risk", ConditionOperator::LessThan, json!("0.5")).matches(&e));
        assert!(!cond("missing", ConditionOperator::GreaterThan, json!(0)).matches(&e));
    }

    #[test]
    fn contains_and_membership() {
        let e = event("x", json!({"country": "NZ"}));
        assert!(cond("user_agent", ConditionOperator::Contains, json!("curl")).matches(&e));
        assert!(cond("country", ConditionOperator::In, json!(["NZ", "AU"])).matches(&e));
        assert!(!cond("country", ConditionOperator::NotIn, json!(["NZ"])).matches(&e));
        assert!(cond("country", ConditionOperator::NotIn, json!(["US"])).matches(&e));
        assert!(!cond("country", ConditionOperator::In, json!("NZ")).matches(&e));
    }

    // -----------------------------------------------------------------------
    // Default rules
    // -----------------------------------------------------------------------

    #[test]
    fn default_rules_match_their_event_types() {
        let rules = default_security_rules();
        let by_id = |id: &str| rules.iter().find(|r| r.id == id).unwrap();

        assert!(by_id("mfa_bypass_attempts").matches(&event("mfa_failed", json!({}))));
        assert!(by_id("multiple_failed_logins").matches(&event("login_failed", json!({}))));
        assert!(!by_id("unusual_location").matches(&event("login_success", json!({}))));
        assert!(by_id("unusual_location").matches(&event("login_success", json!({"new_location": true}))));
        assert_eq!(
            by_id("rapid_api_calls").window,
            Some(RateWindow { minutes: 5, threshold: 100 })
        );
    }

    // -----------------------------------------------------------------------
    // Anomalies
    // -----------------------------------------------------------------------

    #[test]
    fn anomaly_round_trips_through_security_event() {
        let rules = default_security_rules();
        let e = event("mfa_failed", json!({"factor": "totp"}));
        let anomaly = DetectedAnomaly::new(&rules[4], &e, now());
        assert_eq!(anomaly.metadata["rule_name"], json!("MFA Bypass Attempts"));
        assert_eq!(anomaly.metadata["factor"], json!("totp"));

        let record = SecurityEventRecord::from_anomaly(&anomaly, &e);
        assert_eq!(record.event_type, "anomaly_detected");
        assert_eq!(record.description, "Anomaly detected: Detect attempts to bypass MFA");

        let back = DetectedAnomaly::from_event(&record);
        assert_eq!(back.rule_id, "mfa_bypass_attempts");
        assert_eq!(back.severity, SecuritySeverity::Critical);
    }

    #[test]
    fn anomaly_stats_count_by_severity() {
        let rules = default_security_rules();
        let records: Vec<_> = (0..12)
            .map(|i| {
                let rule = &rules[i % 2];
                let e = event("x", json!({}));
                SecurityEventRecord::from_anomaly(&DetectedAnomaly::new(rule, &e, now()), &e)
            })
            .collect();
        let stats = compute_anomaly_stats(&records);
        assert_eq!(stats.total, 12);
        assert_eq!(stats.by_severity["high"], 6);
        assert_eq!(stats.by_severity["medium"], 6);
        assert_eq!(stats.recent.len(), RECENT_ANOMALIES);
    }

    #[test]
    fn failed_auth_events_are_logged_at_medium() {
        let e = event(event_types::LOGIN_FAILED, json!({}));
        let record = SecurityEventRecord::from_auth_event(&e, now());
        assert_eq!(record.severity, SecuritySeverity::Medium);
        assert_eq!(record.description, "login failed");
        assert_eq!(event_severity(event_types::API_REQUEST), SecuritySeverity::Low);
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    #[test]
    fn new_session_expires_in_seven_days() {
        let s = Session::new("u1", None, None, now());
        assert_eq!(s.session_token.len(), 64);
        assert_eq!(s.expires_at, now() + Duration::days(7));
        assert!(s.is_valid(now()));
        assert!(s.is_valid(s.expires_at));
        assert!(!s.is_valid(s.expires_at + Duration::seconds(1)));
    }
}
