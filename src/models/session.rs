use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Session row: one refresh-token lineage per (user, device) pair.
///
/// `refresh_token_hash` holds the SHA-256 fingerprint of the refresh token
/// most recently issued to the device; the raw token is never persisted.
/// Every successful rotation swaps the fingerprint and bumps `version`.
/// `revoked` is a one-way switch.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub revoked: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}
