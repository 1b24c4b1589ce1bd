//! Thin wrapper around the Redis connection manager used as the engine's fast
//! index/queue (SPEC_FULL §4.5/§6). Advisory only: the DB row is always the
//! source of truth (SPEC_FULL §9 "Dual state stores"). Every method here returns
//! `AppResult`, but callers on the fail-open paths (idempotency filter) are
//! expected to match on the error and degrade gracefully rather than propagate it.

use redis::AsyncCommands;

use crate::error::{AppError, AppResult};

pub const QUEUE_KEY: &str = "notification:queue";
pub const RETRIES_ZSET_KEY: &str = "notification:retries";

#[derive(Clone)]
pub struct KvStore {
    manager: redis::aio::ConnectionManager,
}

impl KvStore {
    pub async fn connect(addr: &str, password: Option<&str>) -> AppResult<Self> {
        let url = match password {
            Some(pw) if !pw.is_empty() => format!("redis://:{pw}@{addr}"),
            _ => format!("redis://{addr}"),
        };
        let client = redis::Client::open(url).map_err(|e| AppError::Kv(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::Kv(e.to_string()))?;
        Ok(Self { manager })
    }

    /// Atomic `SET key value NX EX ttl_seconds`. Returns `true` if the key was
    /// newly set (first-seen), `false` if it already existed (dedup hit).
    pub async fn set_nx(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Kv(e.to_string()))?;
        Ok(result.is_some())
    }

    /// `LPUSH` a queue envelope onto the work list (Scheduler promotion step).
    pub async fn lpush(&self, key: &str, value: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .lpush(key, value)
            .await
            .map_err(|e| AppError::Kv(e.to_string()))?;
        Ok(())
    }

    /// `BRPOP` with the given timeout. `None` means the timeout elapsed with no item.
    pub async fn brpop(&self, key: &str, timeout_secs: f64) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        let result: Option<(String, String)> = conn
            .brpop(key, timeout_secs)
            .await
            .map_err(|e| AppError::Kv(e.to_string()))?;
        Ok(result.map(|(_key, value)| value))
    }

    /// Advisory write to the retry sorted set (best-effort; failures are logged
    /// by the caller and never block the retry path — SPEC_FULL §4.7 step 4).
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .zadd(key, member, score)
            .await
            .map_err(|e| AppError::Kv(e.to_string()))?;
        Ok(())
    }

    /// Cleanup loop: prune sorted-set entries scored below `min_score`.
    pub async fn zremrangebyscore(&self, key: &str, min_score: f64) -> AppResult<u64> {
        let mut conn = self.manager.clone();
        let removed: u64 = conn
            .zrembyscore(key, f64::MIN, min_score)
            .await
            .map_err(|e| AppError::Kv(e.to_string()))?;
        Ok(removed)
    }
}
