/// Capability traits for the backing stores the auth core depends on.
///
/// The orchestrator owns the session lineage exclusively: no other component
/// writes fingerprints or revoked flags. Production implementations live in
/// `db` (Postgres), `security::ledger` (Redis), and `services::otp`
/// (Twilio Verify); tests run against in-memory doubles.
use crate::error::Result;
use crate::models::{Device, DeviceDescriptor, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>>;

    /// Create a user for a freshly verified phone number.
    async fn create_from_phone(&self, phone_number: &str) -> Result<User>;

    async fn record_login(&self, user_id: Uuid) -> Result<()>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Stamp `last_seen` when the user's final connection closes.
    async fn update_last_seen(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn find(&self, user_id: Uuid, device_id: &str) -> Result<Option<Device>>;

    async fn find_primary(&self, user_id: Uuid) -> Result<Option<Device>>;

    /// Upsert the device and mark it primary. The caller must have demoted
    /// any other primary first; the one-primary-per-user invariant is
    /// enforced by the store.
    async fn upsert_primary(&self, user_id: Uuid, descriptor: &DeviceDescriptor) -> Result<Device>;

    /// Clear the primary flag on a device.
    async fn demote_primary(&self, user_id: Uuid, device_id: &str) -> Result<()>;

    /// Mark a device inactive (logout).
    async fn deactivate(&self, user_id: Uuid, device_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Revoke every non-revoked session for the (user, device) pair and
    /// return the fingerprints that were live together with their expiry,
    /// so the caller can blacklist them with a matching ledger TTL.
    async fn revoke_all_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>>;

    /// Start a fresh lineage for the pair: fingerprint stored, version 0,
    /// revoked false. Replaces any previous row for the pair (the caller
    /// revokes and blacklists the old lineage first).
    async fn create(
        &self,
        user_id: Uuid,
        device_id: &str,
        fingerprint: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session>;

    /// Atomic conditional rotation, the concurrency linchpin: in a single
    /// read-modify-write, match the row on (user, device, `presented_fp`,
    /// revoked = false, unexpired) and, on match, swap in `next_fp`, bump
    /// the version, extend expiry, and stamp last-used. Returns whether a
    /// row matched. Two racing calls presenting the same token see exactly
    /// one `true`.
    async fn rotate(
        &self,
        user_id: Uuid,
        device_id: &str,
        presented_fp: &str,
        next_fp: &str,
        next_expiry: DateTime<Utc>,
    ) -> Result<bool>;

    async fn find(&self, user_id: Uuid, device_id: &str) -> Result<Option<Session>>;
}

#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Record a retired fingerprint until `expires_at` (the token's natural
    /// expiry, so the ledger self-prunes). Inserting a fingerprint that is
    /// already present is not an error.
    async fn insert(&self, fingerprint: &str, expires_at: DateTime<Utc>) -> Result<()>;

    async fn contains(&self, fingerprint: &str) -> Result<bool>;
}

#[async_trait]
pub trait OtpVerifier: Send + Sync {
    /// Send a verification code. Returns the code's validity in seconds.
    async fn send(&self, phone_number: &str) -> Result<u32>;

    /// Check a code. `Ok(false)` means the code is wrong or expired.
    async fn check(&self, phone_number: &str, code: &str) -> Result<bool>;
}
