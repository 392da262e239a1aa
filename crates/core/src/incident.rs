//! Incident records: deduplication, lifecycle and reporting.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::anomaly::{AlertSeverity, AnomalyAlert, AnomalyType};
use crate::hashing;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown incident status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Incident report
// ---------------------------------------------------------------------------

/// Window within which a repeated alert joins an existing active incident.
pub fn dedup_window() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: String,
    pub alert_type: AnomalyType,
    pub org_id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub started_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub status: IncidentStatus,
    pub affected_runs: Vec<String>,
    /// Latest observed value per alert type.
    pub metrics: BTreeMap<String, f64>,
    /// Append-only log of what happened to this incident.
    pub actions_taken: Vec<String>,
    pub resolution_notes: Option<String>,
}

impl IncidentReport {
    /// Open a new active incident for `alert`.
    pub fn open(alert: &AnomalyAlert) -> Self {
        let id = format!(
            "incident_{}_{}",
            alert.timestamp.timestamp_millis(),
            hashing::random_hex(4)
        );
        Self {
            id,
            alert_type: alert.alert_type,
            org_id: alert.org_id().to_string(),
            severity: alert.severity,
            title: incident_title(alert.alert_type).to_string(),
            description: incident_description(alert),
            started_at: alert.timestamp,
            resolved_at: None,
            status: IncidentStatus::Active,
            affected_runs: alert.run_id().map(str::to_string).into_iter().collect(),
            metrics: BTreeMap::from([(alert.alert_type.to_string(), alert.actual)]),
            actions_taken: vec![format!("Incident created due to {} alert", alert.alert_type)],
            resolution_notes: None,
        }
    }

    /// Whether `alert` should be folded into this incident rather than
    /// opening a new one. The alert's own timestamp is the clock.
    pub fn absorbs(&self, alert: &AnomalyAlert) -> bool {
        self.status == IncidentStatus::Active
            && self.alert_type == alert.alert_type
            && self.org_id == alert.org_id()
            && alert.timestamp - self.started_at < dedup_window()
    }

    /// Record a repeated alert on this incident.
    pub fn absorb(&mut self, alert: &AnomalyAlert) {
        if let Some(run_id) = alert.run_id() {
            self.affected_runs.push(run_id.to_string());
        }
        self.metrics
            .insert(alert.alert_type.to_string(), alert.actual);
        self.actions_taken
            .push(format!("Alert triggered at {}", alert.timestamp.to_rfc3339()));
    }

    /// Move an active incident to acknowledged. Returns `false` for any other
    /// starting status.
    pub fn acknowledge(&mut self, by: &str, now: Timestamp) -> bool {
        if self.status != IncidentStatus::Active {
            return false;
        }
        self.status = IncidentStatus::Acknowledged;
        self.actions_taken
            .push(format!("Acknowledged by {by} at {}", now.to_rfc3339()));
        true
    }

    /// Resolve an active or acknowledged incident. Resolution is terminal.
    pub fn resolve(&mut self, by: &str, notes: Option<String>, now: Timestamp) -> bool {
        if self.status == IncidentStatus::Resolved {
            return false;
        }
        self.status = IncidentStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolution_notes = notes;
        self.actions_taken
            .push(format!("Resolved by {by} at {}", now.to_rfc3339()));
        true
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

pub fn incident_title(alert_type: AnomalyType) -> &'static str {
    match alert_type {
        AnomalyType::BudgetExceeded => "Budget Limit Exceeded",
        AnomalyType::ScoreLow => "Low Performance Scores Detected",
        AnomalyType::ErrorSpike => "High Error Rate Detected",
        AnomalyType::TimeoutSpike => "Multiple Timeouts Detected",
        AnomalyType::KillSwitch => "Agent Kill-Switch Activated",
    }
}

pub fn incident_description(alert: &AnomalyAlert) -> String {
    let mut out = format!("{}\n\n**Details:**\n", alert.message);
    if let Some(m) = &alert.metrics {
        out.push_str(&format!("- Run ID: {}\n", m.run_id));
        out.push_str(&format!("- Org ID: {}\n", m.org_id));
        out.push_str(&format!("- Module: {}\n", m.module_id));
    } else {
        out.push_str(&format!("- Org ID: {}\n", alert.org_id()));
    }
    out.push_str(&format!("- Threshold: {}\n", alert.threshold));
    out.push_str(&format!("- Actual Value: {}\n", alert.actual));
    out.push_str(&format!("- Timestamp: {}\n", alert.timestamp.to_rfc3339()));

    if let Some(m) = &alert.metrics {
        out.push_str("\n**Metrics:**\n");
        out.push_str(&format!("- Tokens: {}\n", m.tokens));
        out.push_str(&format!("- Cost: ${:.4}\n", m.cost));
        out.push_str(&format!("- Duration: {}ms\n", m.duration_ms));
        if let Some(score) = m.score {
            out.push_str(&format!("- Score: {score}\n"));
        }
        out.push_str(&format!("- Error Rate: {:.2}%\n", m.error_rate * 100.0));
    }
    out
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total_incidents: usize,
    pub active_incidents: usize,
    pub resolved_incidents: usize,
    /// Mean of (resolved_at - started_at) over resolved incidents, in minutes.
    pub avg_resolution_time_minutes: f64,
    pub incidents_by_type: BTreeMap<String, usize>,
    pub incidents_by_severity: BTreeMap<String, usize>,
}

pub fn compute_alert_statistics(incidents: &[IncidentReport]) -> AlertStatistics {
    let mut stats = AlertStatistics {
        total_incidents: incidents.len(),
        ..Default::default()
    };

    let mut resolution_ms_total: i64 = 0;
    for i in incidents {
        match i.status {
            IncidentStatus::Active => stats.active_incidents += 1,
            IncidentStatus::Resolved => stats.resolved_incidents += 1,
            IncidentStatus::Acknowledged => {}
        }
        if let (IncidentStatus::Resolved, Some(resolved_at)) = (i.status, i.resolved_at) {
            resolution_ms_total += (resolved_at - i.started_at).num_milliseconds();
        }
        *stats
            .incidents_by_type
            .entry(i.alert_type.to_string())
            .or_default() += 1;
        *stats
            .incidents_by_severity
            .entry(i.severity.to_string())
            .or_default() += 1;
    }

    if stats.resolved_incidents > 0 {
        stats.avg_resolution_time_minutes =
            resolution_ms_total as f64 / stats.resolved_incidents as f64 / 60_000.0;
    }
    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AgentMetrics;
    use chrono::{TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap()
    }

    fn alert(kind: AnomalyType, org: &str, run: &str, at: Timestamp) -> AnomalyAlert {
        AnomalyAlert {
            alert_type: kind,
            severity: AlertSeverity::Critical,
            message: "Token budget exceeded: 13000 > 12000".into(),
            metrics: Some(AgentMetrics {
                run_id: run.into(),
                org_id: org.into(),
                module_id: "mod".into(),
                tokens: 13_000,
                cost: 0.12345,
                duration_ms: 1500,
                score: Some(70.0),
                error_rate: 0.0125,
                timeouts: 0,
                timestamp: at,
            }),
            threshold: 12_000.0,
            actual: 13_000.0,
            timestamp: at,
        }
    }

    // -----------------------------------------------------------------------
    // Dedup
    // -----------------------------------------------------------------------

    #[test]
    fn new_incident_records_run_and_metric() {
        let inc = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r1", t0()));
        assert!(inc.id.starts_with("incident_"));
        assert_eq!(inc.status, IncidentStatus::Active);
        assert_eq!(inc.title, "Budget Limit Exceeded");
        assert_eq!(inc.affected_runs, vec!["r1"]);
        assert_eq!(inc.metrics["budget_exceeded"], 13_000.0);
        assert_eq!(inc.actions_taken, vec!["Incident created due to budget_exceeded alert"]);
    }

    #[test]
    fn repeat_within_the_hour_is_absorbed() {
        let mut inc = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r1", t0()));
        let repeat = alert(AnomalyType::BudgetExceeded, "o", "r2", t0() + Duration::minutes(30));
        assert!(inc.absorbs(&repeat));
        inc.absorb(&repeat);
        assert_eq!(inc.affected_runs, vec!["r1", "r2"]);
        assert_eq!(inc.actions_taken.len(), 2);
        assert!(inc.actions_taken[1].starts_with("Alert triggered at "));
    }

    #[test]
    fn repeat_after_the_hour_is_not_absorbed() {
        let inc = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r1", t0()));
        let late = alert(AnomalyType::BudgetExceeded, "o", "r2", t0() + Duration::minutes(61));
        assert!(!inc.absorbs(&late));
    }

    #[test]
    fn other_org_or_type_is_not_absorbed() {
        let inc = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r1", t0()));
        assert!(!inc.absorbs(&alert(AnomalyType::BudgetExceeded, "p", "r2", t0())));
        assert!(!inc.absorbs(&alert(AnomalyType::TimeoutSpike, "o", "r2", t0())));
    }

    #[test]
    fn acknowledged_incident_does_not_absorb() {
        let mut inc = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r1", t0()));
        assert!(inc.acknowledge("ops", t0()));
        assert!(!inc.absorbs(&alert(AnomalyType::BudgetExceeded, "o", "r2", t0())));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn lifecycle_transitions() {
        let a = alert(AnomalyType::ErrorSpike, "o", "r1", t0());
        let mut inc = IncidentReport::open(&a);

        assert!(inc.acknowledge("alice", t0()));
        assert!(!inc.acknowledge("alice", t0()));
        assert_eq!(inc.status, IncidentStatus::Acknowledged);

        assert!(inc.resolve("bob", Some("rolled back".into()), t0() + Duration::minutes(5)));
        assert_eq!(inc.status, IncidentStatus::Resolved);
        assert_eq!(inc.resolution_notes.as_deref(), Some("rolled back"));
        assert!(inc.actions_taken.last().unwrap().starts_with("Resolved by bob at "));

        assert!(!inc.resolve("bob", None, t0()));
        assert!(!inc.acknowledge("alice", t0()));
    }

    #[test]
    fn active_incident_can_be_resolved_directly() {
        let mut inc = IncidentReport::open(&alert(AnomalyType::ErrorSpike, "o", "r1", t0()));
        assert!(inc.resolve("ops", None, t0()));
        assert_eq!(inc.resolved_at, Some(t0()));
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    #[test]
    fn description_lists_details_and_metrics() {
        let d = incident_description(&alert(AnomalyType::BudgetExceeded, "o", "r1", t0()));
        assert!(d.starts_with("Token budget exceeded: 13000 > 12000\n\n**Details:**\n"));
        assert!(d.contains("- Run ID: r1\n"));
        assert!(d.contains("- Cost: $0.1235\n") || d.contains("- Cost: $0.1234\n"));
        assert!(d.contains("- Score: 70\n"));
        assert!(d.contains("- Error Rate: 1.25%\n"));
    }

    #[test]
    fn description_without_sample_uses_system_org() {
        let mut a = alert(AnomalyType::KillSwitch, "o", "r1", t0());
        a.metrics = None;
        let d = incident_description(&a);
        assert!(d.contains("- Org ID: system\n"));
        assert!(!d.contains("**Metrics:**"));
        assert!(IncidentReport::open(&a).affected_runs.is_empty());
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    #[test]
    fn empty_statistics_are_zero() {
        assert_eq!(compute_alert_statistics(&[]), AlertStatistics::default());
    }

    #[test]
    fn statistics_average_resolution_minutes() {
        let mut a = IncidentReport::open(&alert(AnomalyType::ErrorSpike, "o", "r1", t0()));
        a.resolve("ops", None, t0() + Duration::minutes(10));
        let mut b = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r2", t0()));
        b.resolve("ops", None, t0() + Duration::minutes(30));
        let c = IncidentReport::open(&alert(AnomalyType::BudgetExceeded, "o", "r3", t0()));

        let stats = compute_alert_statistics(&[a, b, c]);
        assert_eq!(stats.total_incidents, 3);
        assert_eq!(stats.active_incidents, 1);
        assert_eq!(stats.resolved_incidents, 2);
        assert_eq!(stats.avg_resolution_time_minutes, 20.0);
        assert_eq!(stats.incidents_by_type["budget_exceeded"], 2);
        assert_eq!(stats.incidents_by_severity["critical"], 3);
    }

    #[test]
    fn status_parses_from_query_strings() {
        assert_eq!("acknowledged".parse::<IncidentStatus>(), Ok(IncidentStatus::Acknowledged));
        assert!("closed".parse::<IncidentStatus>().is_err());
    }
}
