use async_trait::async_trait;
use serde::Deserialize;

use crate::db::models::Notification;
use crate::error::ProviderError;

use super::{Provider, ProviderOutcome};

#[derive(Deserialize)]
struct SmsPayload {
    to: String,
    body: String,
}

/// Writes `{to, body}` to the log instead of calling a real SMS gateway.
/// Selected via `SMS_PROVIDER=console`; always succeeds (SPEC_FULL §4.1.1).
pub struct ConsoleSmsProvider;

#[async_trait]
impl Provider for ConsoleSmsProvider {
    async fn send(&self, notification: &Notification) -> Result<ProviderOutcome, ProviderError> {
        let payload: SmsPayload = serde_json::from_str(&notification.payload)
            .map_err(|e| ProviderError::Permanent(format!("invalid SMS payload: {e}")))?;

        tracing::info!(to = %payload.to, body = %payload.body, "console_sms provider: sms dispatched");

        Ok(ProviderOutcome {
            provider_response: format!(r#"{{"delivered_via":"console_sms","to":"{}"}}"#, payload.to),
        })
    }

    fn name(&self) -> &'static str {
        "console_sms"
    }
}
