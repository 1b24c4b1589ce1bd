//! Provider Contract & Registry (C1). Providers are closed-set variants
//! discriminated by the `provider` tag on a `Notification`; the registry is a
//! flat map built once at startup, never a class hierarchy (SPEC_FULL §9
//! "Registry over inheritance").

pub mod console_sms;
pub mod fcm;
pub mod local;
pub mod smtp;
pub mod textbelt;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::db::models::Notification;
use crate::error::ProviderError;

/// What a successful dispatch yields, merged back into the notification record
/// by the Worker Pool (`status = sent`, `sent_at`, `provider_response`).
pub struct ProviderOutcome {
    pub provider_response: String,
}

/// Capability contract each provider implements (SPEC_FULL §4.1). `send` must
/// not mutate `status` itself — the Worker Pool owns that transition.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<ProviderOutcome, ProviderError>;
    fn name(&self) -> &'static str;
}

/// Per-dispatch timeout recommended by SPEC_FULL §4.1 / §5.
pub const PROVIDER_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Build-once, read-only-after-construction map from provider tag to
/// implementation. An unconfigured integration (e.g. no SMTP credentials) is
/// simply absent from the map rather than crashing startup (SPEC_FULL §4.1);
/// a notification addressed to an absent tag is the Worker Pool's concern
/// (SPEC_FULL §4.6 step 6 — a per-dispatch attempt failure, not a silent
/// substitution, since falling back to `local` would wrongly mark the
/// notification `sent` without actually delivering it).
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut providers: HashMap<&'static str, Box<dyn Provider>> = HashMap::new();

        providers.insert("local", Box::new(local::LocalProvider));
        providers.insert("console_sms", Box::new(console_sms::ConsoleSmsProvider));

        if let Some(api_key) = config.providers.textbelt_api_key.clone() {
            providers.insert(
                "textbelt",
                Box::new(textbelt::TextbeltProvider::new(api_key)),
            );
        } else {
            tracing::warn!("TEXTBELT_API_KEY not set; 'textbelt' provider tag will not be registered");
        }

        if let Some(server_key) = config.providers.fcm_server_key.clone() {
            providers.insert("fcm", Box::new(fcm::FcmProvider::new(server_key)));
        } else {
            tracing::warn!("FCM_SERVER_KEY not set; 'fcm' provider tag will not be registered");
        }

        match smtp::SmtpProvider::from_config(config) {
            Ok(provider) => {
                // One transport shared by all SMTP-flavored tags; `provider.tag()`
                // reports which one SMTP_PROVIDER selected.
                providers.insert(provider.tag(), Box::new(provider));
            }
            Err(e) => {
                tracing::warn!(
                    "SMTP provider not configured ({e}); smtp-flavored provider tags will not be registered"
                );
            }
        }

        Self { providers }
    }

    /// Resolve a provider tag. `None` means the Worker Pool should treat this
    /// dispatch as an attempt failure with reason `provider not configured`
    /// and hand it to the Retry Manager (SPEC_FULL §4.6 step 6).
    pub fn get(&self, tag: &str) -> Option<&dyn Provider> {
        self.providers.get(tag).map(|p| p.as_ref())
    }
}
