//! Monitor and alert-channel configuration loaded from the environment.

use std::collections::BTreeMap;
use std::time::Duration;

use forgewatch_core::alerting::{
    AlertChannel, ChannelKind, CONSOLE_CHANNEL, EMAIL_CHANNEL, SLACK_CHANNEL, WEBHOOK_CHANNEL,
};
use forgewatch_core::anomaly::{AlertSeverity, AnomalyThresholds};
use forgewatch_events::EmailConfig;

const DEFAULT_AUDIT_SECRET: &str = "default-secret-change-in-production";
const DEFAULT_SLACK_CHANNEL: &str = "#alerts";

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// HMAC key for the audit chain.
    pub audit_hmac_secret: String,
    /// `AGENTS_ENABLED` environment toggle. When false agents stay off
    /// regardless of persisted flags or operator actions.
    pub agents_enabled: bool,
    pub thresholds: AnomalyThresholds,
    pub agentwatch_interval: Duration,
    pub health_check_interval: Duration,
    pub run_log_retention: chrono::Duration,
}

impl MonitorConfig {
    /// | Env Var                       | Default                               |
    /// |-------------------------------|---------------------------------------|
    /// | `AUDIT_HMAC_SECRET`           | `default-secret-change-in-production` |
    /// | `AGENTS_ENABLED`              | `true`                                |
    /// | `BUDGET_TOKENS_MAX`           | `12000`                               |
    /// | `BUDGET_COST_USD_MAX_RUN`     | `1.5`                                 |
    /// | `BUDGET_TIMEOUT_MS`           | `20000`                               |
    /// | `MIN_SCORE`                   | `80`                                  |
    /// | `MAX_ERROR_RATE`              | `0.05`                                |
    /// | `MAX_TIMEOUTS`                | `3`                                   |
    /// | `AGENTWATCH_INTERVAL_SECS`    | `60`                                  |
    /// | `HEALTH_CHECK_INTERVAL_SECS`  | `300`                                 |
    /// | `RUN_LOG_RETENTION_HOURS`     | `24`                                  |
    pub fn from_env() -> Self {
        let audit_hmac_secret = std::env::var("AUDIT_HMAC_SECRET").unwrap_or_else(|_| {
            tracing::warn!("AUDIT_HMAC_SECRET not set, using the development default");
            DEFAULT_AUDIT_SECRET.to_string()
        });

        let defaults = AnomalyThresholds::default();
        let thresholds = AnomalyThresholds {
            max_tokens: env_or("BUDGET_TOKENS_MAX", defaults.max_tokens),
            max_cost: env_or("BUDGET_COST_USD_MAX_RUN", defaults.max_cost),
            max_duration_ms: env_or("BUDGET_TIMEOUT_MS", defaults.max_duration_ms),
            min_score: env_or("MIN_SCORE", defaults.min_score),
            max_error_rate: env_or("MAX_ERROR_RATE", defaults.max_error_rate),
            max_timeouts: env_or("MAX_TIMEOUTS", defaults.max_timeouts),
        };

        Self {
            audit_hmac_secret,
            agents_enabled: env_or("AGENTS_ENABLED", true),
            thresholds,
            agentwatch_interval: Duration::from_secs(env_or("AGENTWATCH_INTERVAL_SECS", 60)),
            health_check_interval: Duration::from_secs(env_or("HEALTH_CHECK_INTERVAL_SECS", 300)),
            run_log_retention: chrono::Duration::hours(env_or("RUN_LOG_RETENTION_HOURS", 24)),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            audit_hmac_secret: DEFAULT_AUDIT_SECRET.to_string(),
            agents_enabled: true,
            thresholds: AnomalyThresholds::default(),
            agentwatch_interval: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(300),
            run_log_retention: chrono::Duration::hours(24),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub slack_webhook_url: Option<String>,
    pub slack_channel: String,
    pub alert_webhook_url: Option<String>,
    pub alert_email_recipients: Vec<String>,
    pub email: Option<EmailConfig>,
}

impl ChannelConfig {
    /// | Env Var                  | Default   |
    /// |--------------------------|-----------|
    /// | `SLACK_WEBHOOK_URL`      | unset     |
    /// | `SLACK_CHANNEL`          | `#alerts` |
    /// | `ALERT_WEBHOOK_URL`      | unset     |
    /// | `ALERT_EMAIL_RECIPIENTS` | empty     |
    ///
    /// SMTP settings are read by [`EmailConfig::from_env`].
    pub fn from_env() -> Self {
        Self {
            slack_webhook_url: std::env::var("SLACK_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            slack_channel: std::env::var("SLACK_CHANNEL")
                .unwrap_or_else(|_| DEFAULT_SLACK_CHANNEL.to_string()),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            alert_email_recipients: std::env::var("ALERT_EMAIL_RECIPIENTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            email: EmailConfig::from_env(),
        }
    }

    /// The four built-in channels. Console is always enabled; the others
    /// are enabled only when their delivery target is configured.
    pub fn channels(&self) -> Vec<AlertChannel> {
        use AlertSeverity::{Critical, Warning};

        vec![
            AlertChannel {
                id: CONSOLE_CHANNEL.into(),
                kind: ChannelKind::Console,
                enabled: true,
                severity_filter: vec![Warning, Critical],
            },
            AlertChannel {
                id: SLACK_CHANNEL.into(),
                kind: ChannelKind::Slack {
                    webhook_url: self.slack_webhook_url.clone().unwrap_or_default(),
                    channel: self.slack_channel.clone(),
                },
                enabled: self.slack_webhook_url.is_some(),
                severity_filter: vec![Critical],
            },
            AlertChannel {
                id: EMAIL_CHANNEL.into(),
                kind: ChannelKind::Email {
                    recipients: self.alert_email_recipients.clone(),
                },
                enabled: self.email.is_some(),
                severity_filter: vec![Critical],
            },
            AlertChannel {
                id: WEBHOOK_CHANNEL.into(),
                kind: ChannelKind::Webhook {
                    url: self.alert_webhook_url.clone().unwrap_or_default(),
                    headers: BTreeMap::new(),
                },
                enabled: self.alert_webhook_url.is_some(),
                severity_filter: vec![Warning, Critical],
            },
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
