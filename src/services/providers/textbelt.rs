use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Notification;
use crate::error::ProviderError;

use super::{Provider, ProviderOutcome, PROVIDER_SEND_TIMEOUT};

#[derive(Deserialize)]
struct SmsPayload {
    to: String,
    body: String,
}

#[derive(Deserialize)]
struct TextbeltResponse {
    success: bool,
    error: Option<String>,
}

const TEXTBELT_URL: &str = "https://textbelt.com/text";

/// SMS channel over the Textbelt HTTP API. Selected via `SMS_PROVIDER=textbelt`,
/// requires `TEXTBELT_API_KEY` (SPEC_FULL §4.1.1).
pub struct TextbeltProvider {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
}

impl TextbeltProvider {
    pub fn new(api_key: String) -> Self {
        Self::build(api_key, TEXTBELT_URL.to_string())
    }

    /// Test-only hook: points at a `wiremock` server instead of the real API.
    #[cfg(test)]
    fn new_with_endpoint(api_key: String, endpoint: String) -> Self {
        Self::build(api_key, endpoint)
    }

    fn build(api_key: String, endpoint: String) -> Self {
        Self {
            api_key,
            endpoint,
            client: reqwest::Client::builder()
                .timeout(PROVIDER_SEND_TIMEOUT)
                .build()
                .expect("reqwest client builder should not fail with default TLS config"),
        }
    }
}

#[async_trait]
impl Provider for TextbeltProvider {
    async fn send(&self, notification: &Notification) -> Result<ProviderOutcome, ProviderError> {
        let payload: SmsPayload = serde_json::from_str(&notification.payload)
            .map_err(|e| ProviderError::Permanent(format!("invalid SMS payload: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "phone": payload.to,
                "message": payload.body,
                "key": self.api_key,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("textbelt request failed: {e}")))?;

        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to read textbelt response: {e}")))?;

        let parsed: TextbeltResponse = serde_json::from_str(&body_text)
            .map_err(|e| ProviderError::Transient(format!("invalid textbelt response: {e}")))?;

        if !parsed.success {
            let msg = parsed.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(ProviderError::Transient(format!("textbelt error: {msg}")));
        }

        Ok(ProviderOutcome {
            provider_response: body_text,
        })
    }

    fn name(&self) -> &'static str {
        "textbelt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification(payload: &str) -> Notification {
        Notification {
            id: "00000000-0000-0000-0000-000000000000".to_string(),
            user_id: "user-1".to_string(),
            message_type: "sms".to_string(),
            provider: "textbelt".to_string(),
            idempotency_key: "key".to_string(),
            status: "pending".to_string(),
            payload: payload.to_string(),
            attempt_count: 1,
            max_retries: 5,
            send_at: None,
            last_attempted: None,
            sent_at: None,
            failed_at: None,
            error_message: None,
            provider_response: None,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn successful_send_returns_the_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
            .mount(&server)
            .await;

        let provider = TextbeltProvider::new_with_endpoint(
            "test-key".to_string(),
            format!("{}/text", server.uri()),
        );
        let n = notification(r#"{"to":"+15555550100","body":"hi"}"#);
        let outcome = provider.send(&n).await.unwrap();
        assert!(outcome.provider_response.contains("success"));
    }

    #[tokio::test]
    async fn gateway_failure_is_a_transient_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"success":false,"error":"invalid phone"}"#),
            )
            .mount(&server)
            .await;

        let provider = TextbeltProvider::new_with_endpoint(
            "test-key".to_string(),
            format!("{}/text", server.uri()),
        );
        let n = notification(r#"{"to":"bad","body":"hi"}"#);
        let err = provider.send(&n).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
    }
}
