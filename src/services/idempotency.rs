//! Idempotency Filter (C3): a short-TTL content-addressed guard in front of
//! `NotificationRepository::create`. Fails open — if the KV store is down we log
//! and treat the item as not-a-duplicate; the DB's unique index on
//! `idempotency_key` remains the authoritative I1 enforcer (SPEC_FULL §4.3).

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::kv::KvStore;

const DEDUP_TTL_SECONDS: u64 = 86_400;

/// Fingerprint = SHA-256 hex of `"{user_id}:{message_type}:{payload}:{epoch_seconds}"`
/// when the caller supplied no explicit key. Note `epoch_seconds` is baked into the
/// hash, so the same payload resubmitted a second later is a distinct notification
/// (SPEC_FULL §9 open question — left as-is, unresolved).
pub fn fingerprint(user_id: &str, message_type: &str, payload: &str) -> String {
    let epoch_seconds = Utc::now().timestamp();
    let input = format!("{user_id}:{message_type}:{payload}:{epoch_seconds}");
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

pub struct IdempotencyFilter<'a> {
    kv: &'a KvStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupResult {
    FirstSeen,
    Duplicate,
}

impl<'a> IdempotencyFilter<'a> {
    pub fn new(kv: &'a KvStore) -> Self {
        Self { kv }
    }

    /// Atomic set-if-absent against `notif:sent:<fingerprint>`. Fails open on KV
    /// unavailability: logs a warning and reports `FirstSeen` so Submit proceeds
    /// to `create`, relying on the DB unique index.
    pub async fn check_and_set(&self, key: &str) -> DedupResult {
        let redis_key = format!("notif:sent:{key}");
        match self.kv.set_nx(&redis_key, "1", DEDUP_TTL_SECONDS).await {
            Ok(true) => DedupResult::FirstSeen,
            Ok(false) => DedupResult::Duplicate,
            Err(e) => {
                tracing::warn!("idempotency filter failing open: {e}");
                DedupResult::FirstSeen
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_64_hex_chars() {
        let fp = fingerprint("user-1", "email", "{\"to\":\"a@b.com\"}");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_differs_across_inputs() {
        let a = fingerprint("user-1", "email", "payload-a");
        let b = fingerprint("user-1", "email", "payload-b");
        assert_ne!(a, b);
    }
}
