/// Refresh-token revocation ledger
///
/// Redis-backed blacklist of retired refresh-token fingerprints. Every
/// entry expires with the token's own natural expiry, so the ledger prunes
/// itself and never grows without bound.
use crate::error::{ApiError, Result};
use crate::store::RevocationLedger;
use crate::SharedConnectionManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

const MIN_ENTRY_TTL_SECS: i64 = 300;

const KEY_PREFIX: &str = "courier:revoked:rt:";

#[derive(Clone)]
pub struct RedisRevocationLedger {
    redis: SharedConnectionManager,
}

impl RedisRevocationLedger {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    fn key(fingerprint: &str) -> String {
        format!("{}{}", KEY_PREFIX, fingerprint)
    }
}

#[async_trait]
impl RevocationLedger for RedisRevocationLedger {
    async fn insert(&self, fingerprint: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let remaining = (expires_at - Utc::now()).num_seconds().max(MIN_ENTRY_TTL_SECS);

        let mut conn = self.redis.lock().await.clone();
        // SET is idempotent: re-inserting an already-blacklisted
        // fingerprint just refreshes the entry.
        redis::cmd("SET")
            .arg(Self::key(fingerprint))
            .arg("1")
            .arg("EX")
            .arg(remaining as u64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| ApiError::Redis(e.to_string()))?;

        tracing::debug!(
            ttl_secs = remaining,
            "Fingerprint added to revocation ledger"
        );
        Ok(())
    }

    async fn contains(&self, fingerprint: &str) -> Result<bool> {
        let mut conn = self.redis.lock().await.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(fingerprint))
            .query_async(&mut conn)
            .await
            .map_err(|e| ApiError::Redis(e.to_string()))?;

        Ok(exists)
    }
}
