use async_trait::async_trait;
use serde_json::{json, Value};

use crate::db::models::Notification;
use crate::error::ProviderError;

use super::{Provider, ProviderOutcome, PROVIDER_SEND_TIMEOUT};

const FCM_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Push channel over the FCM legacy HTTP endpoint. Payload carries `token` or
/// `topic`, `title`, `body`, optional `data`. Selected via the `fcm` provider
/// tag, requires `FCM_SERVER_KEY` (SPEC_FULL §4.1.1).
pub struct FcmProvider {
    server_key: String,
    client: reqwest::Client,
    endpoint: String,
}

impl FcmProvider {
    pub fn new(server_key: String) -> Self {
        Self::build(server_key, FCM_URL.to_string())
    }

    /// Test-only hook: points at a `wiremock` server instead of the real API.
    #[cfg(test)]
    fn new_with_endpoint(server_key: String, endpoint: String) -> Self {
        Self::build(server_key, endpoint)
    }

    fn build(server_key: String, endpoint: String) -> Self {
        Self {
            server_key,
            endpoint,
            client: reqwest::Client::builder()
                .timeout(PROVIDER_SEND_TIMEOUT)
                .build()
                .expect("reqwest client builder should not fail with default TLS config"),
        }
    }
}

#[async_trait]
impl Provider for FcmProvider {
    async fn send(&self, notification: &Notification) -> Result<ProviderOutcome, ProviderError> {
        let payload: Value = serde_json::from_str(&notification.payload)
            .map_err(|e| ProviderError::Permanent(format!("invalid push payload: {e}")))?;

        let token = payload.get("token").and_then(Value::as_str);
        let topic = payload.get("topic").and_then(Value::as_str);
        let target = match (token, topic) {
            (Some(t), _) => t.to_string(),
            (None, Some(topic)) => format!("/topics/{topic}"),
            (None, None) => {
                return Err(ProviderError::Permanent(
                    "missing 'token' or 'topic' field in payload".to_string(),
                ))
            }
        };

        let mut fcm_message = json!({
            "to": target,
            "notification": {
                "title": payload.get("title"),
                "body": payload.get("body"),
            },
        });
        if let Some(data) = payload.get("data") {
            fcm_message["data"] = data.clone();
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&fcm_message)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("FCM request failed: {e}")))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to read FCM response: {e}")))?;

        if status.is_client_error() || status.is_server_error() {
            return Err(ProviderError::Transient(format!(
                "FCM returned error status {status}: {body_text}"
            )));
        }

        let result: Value = serde_json::from_str(&body_text)
            .map_err(|e| ProviderError::Transient(format!("invalid FCM response: {e}")))?;

        let success = result.get("success").and_then(Value::as_i64).unwrap_or(0);
        if success > 0 {
            return Ok(ProviderOutcome {
                provider_response: body_text,
            });
        }

        let failure = result.get("failure").and_then(Value::as_i64).unwrap_or(0);
        if failure > 0 {
            let error_msg = result
                .get("results")
                .and_then(Value::as_array)
                .and_then(|r| r.first())
                .and_then(|r| r.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("FCM send failed");
            return Err(ProviderError::Transient(format!("FCM error: {error_msg}")));
        }

        Err(ProviderError::Transient(format!(
            "unexpected FCM response: {body_text}"
        )))
    }

    fn name(&self) -> &'static str {
        "fcm"
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
            message_type: "push".to_string(),
            provider: "fcm".to_string(),
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
    async fn successful_send_reports_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":1,"failure":0}"#))
            .mount(&server)
            .await;

        let provider =
            FcmProvider::new_with_endpoint("server-key".to_string(), format!("{}/send", server.uri()));
        let n = notification(r#"{"token":"device-token","title":"Hi","body":"there"}"#);
        let outcome = provider.send(&n).await.unwrap();
        assert!(outcome.provider_response.contains("success"));
    }

    #[tokio::test]
    async fn missing_target_is_a_permanent_error() {
        let provider = FcmProvider::new_with_endpoint("server-key".to_string(), "http://unused".to_string());
        let n = notification(r#"{"title":"Hi","body":"there"}"#);
        let err = provider.send(&n).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[tokio::test]
    async fn fcm_failure_count_is_a_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":0,"failure":1,"results":[{"error":"NotRegistered"}]}"#,
            ))
            .mount(&server)
            .await;

        let provider =
            FcmProvider::new_with_endpoint("server-key".to_string(), format!("{}/send", server.uri()));
        let n = notification(r#"{"token":"stale-token","title":"Hi","body":"there"}"#);
        let err = provider.send(&n).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transient(_)));
    }
}
