use async_trait::async_trait;
use chrono::Utc;

use crate::db::models::Notification;
use crate::error::ProviderError;

use super::{Provider, ProviderOutcome};

/// Logs the payload and reports success immediately. The default fallback
/// provider and a reasonable choice for `provider: "local"` notifications
/// used in development/testing (SPEC_FULL §4.1.1).
pub struct LocalProvider;

#[async_trait]
impl Provider for LocalProvider {
    async fn send(&self, notification: &Notification) -> Result<ProviderOutcome, ProviderError> {
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            message_type = %notification.message_type,
            payload = %notification.payload,
            "local provider: delivering notification"
        );

        Ok(ProviderOutcome {
            provider_response: format!(r#"{{"delivered_via":"local","at":"{}"}}"#, Utc::now()),
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
