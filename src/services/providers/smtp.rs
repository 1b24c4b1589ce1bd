use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use crate::config::Config;
use crate::db::models::Notification;
use crate::error::ProviderError;

use super::{Provider, ProviderOutcome};

#[derive(Deserialize)]
struct EmailPayload {
    to: String,
    subject: Option<String>,
    body: String,
    from: Option<String>,
}

/// SMTP transport shared by `gmail`, `outlook`, and `custom_smtp` provider tags —
/// all three are the same channel, parameterized by host/port/credentials
/// selected from `SMTP_PROVIDER` (SPEC_FULL §4.1.1).
pub struct SmtpProvider {
    tag: &'static str,
    default_from: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpProvider {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let p = &config.providers;
        let (tag, host, port, username, password, from) = match p.smtp_provider.as_str() {
            "gmail" => (
                "gmail",
                "smtp.gmail.com".to_string(),
                587u16,
                p.smtp_username.clone(),
                p.smtp_password.clone(),
                p.smtp_from.clone(),
            ),
            "outlook" => (
                "outlook",
                "smtp-mail.outlook.com".to_string(),
                587u16,
                p.smtp_username.clone(),
                p.smtp_password.clone(),
                p.smtp_from.clone(),
            ),
            _ => (
                "custom_smtp",
                p.smtp_host.clone(),
                p.smtp_port,
                p.smtp_username.clone(),
                p.smtp_password.clone(),
                p.smtp_from.clone(),
            ),
        };

        let (username, password, from) = match (username, password, from) {
            (Some(u), Some(pw), Some(f)) => (u, pw, f),
            _ => anyhow::bail!("SMTP credentials (username/password/from) are not fully configured"),
        };

        let creds = Credentials::new(username, password);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)?
            .port(port)
            .credentials(creds)
            .build();

        Ok(Self {
            tag,
            default_from: from,
            mailer,
        })
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }
}

#[async_trait]
impl Provider for SmtpProvider {
    async fn send(&self, notification: &Notification) -> Result<ProviderOutcome, ProviderError> {
        let payload: EmailPayload = serde_json::from_str(&notification.payload)
            .map_err(|e| ProviderError::Permanent(format!("invalid email payload: {e}")))?;

        let from = payload.from.unwrap_or_else(|| self.default_from.clone());
        let subject = payload.subject.unwrap_or_else(|| "Notification".to_string());

        let email = Message::builder()
            .from(from.parse().map_err(|e| {
                ProviderError::Permanent(format!("invalid 'from' address: {e}"))
            })?)
            .to(payload.to.parse().map_err(|e| {
                ProviderError::Permanent(format!("invalid 'to' address: {e}"))
            })?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(payload.body)
            .map_err(|e| ProviderError::Permanent(format!("failed to build email: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| ProviderError::Transient(format!("SMTP send failed: {e}")))?;

        Ok(ProviderOutcome {
            provider_response: format!("email sent via {} to {}", self.tag, payload.to),
        })
    }

    fn name(&self) -> &'static str {
        self.tag
    }
}
