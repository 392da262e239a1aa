//! Delivery of processed alerts to their channels.

use async_trait::async_trait;
use chrono::Utc;
use forgewatch_core::alerting::{AlertChannel, ChannelKind};
use forgewatch_core::anomaly::{AlertSeverity, AnomalyAlert};
use forgewatch_core::incident::IncidentReport;
use forgewatch_events::delivery::email::EmailError;
use forgewatch_events::delivery::slack;
use forgewatch_events::delivery::webhook::WebhookError;
use forgewatch_events::{EmailDelivery, EmailIntent, WebhookDelivery};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("Channel {0} has no delivery configured")]
    NotConfigured(String),
}

/// Delivers one alert to one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        channel: &AlertChannel,
        alert: &AnomalyAlert,
        incident: &IncidentReport,
    ) -> Result<(), NotifyError>;
}

/// The production notifier: tracing for the console, HTTP for chat and
/// generic webhooks, SMTP for email.
pub struct ChannelNotifier {
    webhook: WebhookDelivery,
    email: Option<EmailDelivery>,
}

impl ChannelNotifier {
    pub fn new(webhook: WebhookDelivery, email: Option<EmailDelivery>) -> Self {
        Self { webhook, email }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(
        &self,
        channel: &AlertChannel,
        alert: &AnomalyAlert,
        incident: &IncidentReport,
    ) -> Result<(), NotifyError> {
        match &channel.kind {
            ChannelKind::Console => {
                match alert.severity {
                    AlertSeverity::Critical => tracing::error!(
                        target: "forgewatch::alerts",
                        incident_id = %incident.id,
                        alert_type = %alert.alert_type,
                        org_id = alert.org_id(),
                        "[ALERT] {}",
                        alert.message
                    ),
                    AlertSeverity::Warning => tracing::warn!(
                        target: "forgewatch::alerts",
                        incident_id = %incident.id,
                        alert_type = %alert.alert_type,
                        org_id = alert.org_id(),
                        "[ALERT] {}",
                        alert.message
                    ),
                }
                Ok(())
            }
            ChannelKind::Slack {
                webhook_url,
                channel: slack_channel,
            } => {
                let payload = slack::alert_payload(slack_channel, alert, incident);
                self.webhook
                    .post_json(webhook_url, &Default::default(), &payload)
                    .await?;
                Ok(())
            }
            ChannelKind::Email { recipients } => {
                let Some(email) = &self.email else {
                    return Err(NotifyError::NotConfigured(channel.id.clone()));
                };
                email
                    .send(&EmailIntent::for_incident(alert, incident, recipients))
                    .await?;
                Ok(())
            }
            ChannelKind::Webhook { url, headers } => {
                let payload = json!({
                    "alert": alert,
                    "incident": incident,
                    "timestamp": Utc::now(),
                });
                self.webhook.post_json(url, headers, &payload).await?;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use forgewatch_core::anomaly::AnomalyType;

    fn alert() -> AnomalyAlert {
        AnomalyAlert {
            alert_type: AnomalyType::TimeoutSpike,
            severity: AlertSeverity::Critical,
            message: "Timeout spike: 5 > 3".into(),
            metrics: None,
            threshold: 3.0,
            actual: 5.0,
            timestamp: Utc::now(),
        }
    }

    fn channel(kind: ChannelKind) -> AlertChannel {
        AlertChannel {
            id: "test".into(),
            kind,
            enabled: true,
            severity_filter: vec![AlertSeverity::Critical],
        }
    }

    #[tokio::test]
    async fn console_always_succeeds() {
        let notifier = ChannelNotifier::new(WebhookDelivery::new(), None);
        let alert = alert();
        let incident = IncidentReport::open(&alert);
        notifier
            .notify(&channel(ChannelKind::Console), &alert, &incident)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn email_without_smtp_is_not_configured() {
        let notifier = ChannelNotifier::new(WebhookDelivery::new(), None);
        let alert = alert();
        let incident = IncidentReport::open(&alert);
        let result = notifier
            .notify(
                &channel(ChannelKind::Email {
                    recipients: vec!["ops@example.com".into()],
                }),
                &alert,
                &incident,
            )
            .await;
        assert_matches!(result, Err(NotifyError::NotConfigured(id)) if id == "test");
    }

    #[tokio::test]
    async fn unreachable_webhook_fails() {
        let notifier = ChannelNotifier::new(WebhookDelivery::new(), None);
        let alert = alert();
        let incident = IncidentReport::open(&alert);
        let result = notifier
            .notify(
                &channel(ChannelKind::Webhook {
                    url: "http://127.0.0.1:9/hook".into(),
                    headers: Default::default(),
                }),
                &alert,
                &incident,
            )
            .await;
        assert_matches!(result, Err(NotifyError::Webhook(_)));
    }
}
