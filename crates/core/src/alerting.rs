//! Alert routing configuration: rules, channels and cooldown tracking.
//!
//! Pure logic; delivery happens in `forgewatch_monitor::notifier`.

use std::collections::{BTreeMap, HashMap};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::anomaly::{AlertSeverity, AnomalyType};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// What a rule watches. Each condition corresponds to exactly one anomaly
/// type, so rule lookup never depends on string formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    /// Mean error rate over the analysis window above the threshold.
    ErrorRateAbove,
    /// Per-run token or cost budget exceeded.
    BudgetExceeded,
    /// Mean score below the threshold.
    ScoreBelow,
    /// Per-run timeout count above the threshold.
    TimeoutsAbove,
}

impl AlertCondition {
    pub fn anomaly_type(self) -> AnomalyType {
        match self {
            Self::ErrorRateAbove => AnomalyType::ErrorSpike,
            Self::BudgetExceeded => AnomalyType::BudgetExceeded,
            Self::ScoreBelow => AnomalyType::ScoreLow,
            Self::TimeoutsAbove => AnomalyType::TimeoutSpike,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    pub severity: AlertSeverity,
    /// Channel ids this rule is intended for.
    pub channels: Vec<String>,
    pub cooldown_minutes: i64,
    pub enabled: bool,
}

impl AlertRule {
    fn new(
        id: &str,
        name: &str,
        condition: AlertCondition,
        threshold: f64,
        severity: AlertSeverity,
        channels: &[&str],
        cooldown_minutes: i64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            condition,
            threshold,
            severity,
            channels: channels.iter().map(|c| c.to_string()).collect(),
            cooldown_minutes,
            enabled: true,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes)
    }
}

pub fn default_rules() -> Vec<AlertRule> {
    use AlertCondition::*;
    use AlertSeverity::*;
    vec![
        AlertRule::new(
            "high-error-rate",
            "High Error Rate",
            ErrorRateAbove,
            0.1,
            Critical,
            &[CONSOLE_CHANNEL, SLACK_CHANNEL, EMAIL_CHANNEL],
            15,
        ),
        AlertRule::new(
            "budget-exceeded",
            "Budget Exceeded",
            BudgetExceeded,
            1.0,
            Critical,
            &[CONSOLE_CHANNEL, SLACK_CHANNEL],
            5,
        ),
        AlertRule::new(
            "low-score-trend",
            "Low Score Trend",
            ScoreBelow,
            75.0,
            Warning,
            &[CONSOLE_CHANNEL, SLACK_CHANNEL],
            30,
        ),
        AlertRule::new(
            "timeout-spike",
            "Timeout Spike",
            TimeoutsAbove,
            3.0,
            Critical,
            &[CONSOLE_CHANNEL, SLACK_CHANNEL],
            10,
        ),
    ]
}

/// The enabled rule governing alerts of `alert_type`, if any.
pub fn rule_for(rules: &[AlertRule], alert_type: AnomalyType) -> Option<&AlertRule> {
    rules
        .iter()
        .find(|r| r.enabled && r.condition.anomaly_type() == alert_type)
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

pub const CONSOLE_CHANNEL: &str = "console";
pub const SLACK_CHANNEL: &str = "slack-ops";
pub const EMAIL_CHANNEL: &str = "email-admin";
pub const WEBHOOK_CHANNEL: &str = "webhook";

/// Channel kind together with the configuration its delivery needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelKind {
    Console,
    Slack {
        webhook_url: String,
        channel: String,
    },
    Email {
        recipients: Vec<String>,
    },
    Webhook {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertChannel {
    pub id: String,
    pub kind: ChannelKind,
    pub enabled: bool,
    pub severity_filter: Vec<AlertSeverity>,
}

impl AlertChannel {
    pub fn accepts(&self, severity: AlertSeverity) -> bool {
        self.enabled && self.severity_filter.contains(&severity)
    }
}

/// Channels that should receive an alert of `severity`.
pub fn channels_for(channels: &[AlertChannel], severity: AlertSeverity) -> Vec<&AlertChannel> {
    channels.iter().filter(|c| c.accepts(severity)).collect()
}

// ---------------------------------------------------------------------------
// Cooldown tracking
// ---------------------------------------------------------------------------

/// Tracks when each (alert type, organization) pair last fired so repeats
/// inside a rule's cooldown can be suppressed.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fired: HashMap<(AnomalyType, String), Timestamp>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the cooldown and record the firing if allowed.
    ///
    /// Returns `true` if the alert should proceed. Without a cooldown (no
    /// governing rule) the alert always proceeds and is still recorded.
    pub fn try_fire(
        &mut self,
        alert_type: AnomalyType,
        org_id: &str,
        cooldown: Option<Duration>,
        now: Timestamp,
    ) -> bool {
        let key = (alert_type, org_id.to_string());
        if let (Some(cooldown), Some(last)) = (cooldown, self.last_fired.get(&key)) {
            if now.signed_duration_since(*last) < cooldown {
                return false;
            }
        }
        self.last_fired.insert(key, now);
        true
    }

    pub fn last_fired(&self, alert_type: AnomalyType, org_id: &str) -> Option<Timestamp> {
        self.last_fired
            .get(&(alert_type, org_id.to_string()))
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
