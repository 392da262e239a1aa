//! Slack-style chat webhook payloads.

use forgewatch_core::anomaly::{AlertSeverity, AnomalyAlert};
use forgewatch_core::incident::IncidentReport;
use serde_json::{json, Value};

const USERNAME: &str = "Forgewatch Monitor";
const FOOTER: &str = "Forgewatch Monitoring";
const RUN_ID_PREFIX_CHARS: usize = 8;

fn color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "#ff0000",
        AlertSeverity::Warning => "#ffaa00",
    }
}

fn emoji(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => ":rotating_light:",
        AlertSeverity::Warning => ":warning:",
    }
}

fn field(title: &str, value: String) -> Value {
    json!({ "title": title, "value": value, "short": true })
}

/// Build the attachment payload posted to a chat webhook for one alert.
pub fn alert_payload(channel: &str, alert: &AnomalyAlert, incident: &IncidentReport) -> Value {
    let run_id = match alert.run_id() {
        Some(id) => format!("{}...", id.chars().take(RUN_ID_PREFIX_CHARS).collect::<String>()),
        None => "n/a".to_string(),
    };
    let module = alert
        .metrics
        .as_ref()
        .map(|m| m.module_id.clone())
        .unwrap_or_else(|| "n/a".to_string());

    json!({
        "channel": channel,
        "username": USERNAME,
        "icon_emoji": ":robot_face:",
        "attachments": [{
            "color": color(alert.severity),
            "title": format!("{} {}", emoji(alert.severity), incident.title),
            "text": alert.message,
            "fields": [
                field("Severity", alert.severity.as_str().to_uppercase()),
                field("Type", alert.alert_type.to_string()),
                field("Run ID", run_id),
                field("Module", module),
                field("Threshold", alert.threshold.to_string()),
                field("Actual", alert.actual.to_string()),
            ],
            "footer": FOOTER,
            "ts": alert.timestamp.timestamp(),
        }],
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use forgewatch_core::anomaly::{AgentMetrics, AnomalyType};

    fn alert(severity: AlertSeverity, with_metrics: bool) -> AnomalyAlert {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AnomalyAlert {
            alert_type: AnomalyType::BudgetExceeded,
            severity,
            message: "Token budget exceeded: 15000 > 12000".into(),
            metrics: with_metrics.then(|| AgentMetrics {
                run_id: "abcdef0123456789".into(),
                org_id: "org-1".into(),
                module_id: "summarize".into(),
                tokens: 15000,
                cost: 0.2,
                duration_ms: 900,
                score: Some(90.0),
                error_rate: 0.0,
                timeouts: 0,
                timestamp: ts,
            }),
            threshold: 12000.0,
            actual: 15000.0,
            timestamp: ts,
        }
    }

    #[test]
    fn critical_payload_uses_red_and_truncated_run_id() {
        let a = alert(AlertSeverity::Critical, true);
        let incident = IncidentReport::open(&a);
        let payload = alert_payload("#ops", &a, &incident);

        let attachment = &payload["attachments"][0];
        assert_eq!(payload["channel"], "#ops");
        assert_eq!(attachment["color"], "#ff0000");
        assert_eq!(attachment["fields"][0]["value"], "CRITICAL");
        assert_eq!(attachment["fields"][1]["value"], "budget_exceeded");
        assert_eq!(attachment["fields"][2]["value"], "abcdef01...");
        assert_eq!(attachment["fields"][3]["value"], "summarize");
        assert_eq!(attachment["fields"][5]["value"], "15000");
        assert_eq!(attachment["ts"], a.timestamp.timestamp());
    }

    #[test]
    fn synthetic_alert_without_metrics_still_renders() {
        let a = alert(AlertSeverity::Warning, false);
        let incident = IncidentReport::open(&a);
        let payload = alert_payload("#ops", &a, &incident);

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], "#ffaa00");
        assert_eq!(attachment["fields"][2]["value"], "n/a");
        assert_eq!(attachment["fields"][3]["value"], "n/a");
    }
}
