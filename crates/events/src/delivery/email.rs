//! Email notification delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport. Configuration
//! comes from the environment; without `SMTP_HOST`, [`EmailConfig::from_env`]
//! returns `None` and no mailer is constructed.

use forgewatch_core::anomaly::AnomalyAlert;
use forgewatch_core::incident::IncidentReport;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "alerts@forgewatch.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// | Variable        | Required | Default                   |
    /// |-----------------|----------|---------------------------|
    /// | `SMTP_HOST`     | yes      |                           |
    /// | `SMTP_PORT`     | no       | `587`                     |
    /// | `SMTP_FROM`     | no       | `alerts@forgewatch.local` |
    /// | `SMTP_USER`     | no       |                           |
    /// | `SMTP_PASSWORD` | no       |                           |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailIntent
// ---------------------------------------------------------------------------

/// A notification email waiting to be handed to the SMTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailIntent {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

impl EmailIntent {
    pub fn for_incident(
        alert: &AnomalyAlert,
        incident: &IncidentReport,
        recipients: &[String],
    ) -> Self {
        Self {
            subject: format!(
                "[{}] {}",
                alert.severity.as_str().to_uppercase(),
                incident.title
            ),
            body: incident.description.clone(),
            recipients: recipients.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send one plain-text message addressed to every recipient.
    pub async fn send(&self, intent: &EmailIntent) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        if intent.recipients.is_empty() {
            return Err(EmailError::Build("no recipients".into()));
        }

        let mut builder = Message::builder()
            .from(self.config.from_address.parse()?)
            .subject(intent.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &intent.recipients {
            builder = builder.to(recipient.parse()?);
        }
        let email = builder
            .body(intent.body.clone())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport_builder.build().send(email).await?;

        tracing::info!(
            recipients = intent.recipients.len(),
            subject = %intent.subject,
            "Notification email sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
