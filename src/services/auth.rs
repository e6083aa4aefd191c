/// Auth orchestration
///
/// OTP-driven login/registration, primary-device hand-off, and the
/// refresh-rotation protocol. This service is the only writer of session
/// fingerprints and revoked flags.
use crate::error::{ApiError, Result};
use crate::models::{DeviceDescriptor, UserProfile};
use crate::security::jwt::{fingerprint, TokenKind, TokenService};
use crate::services::otp::mask_phone;
use crate::store::{DeviceRegistry, OtpVerifier, RevocationLedger, SessionStore, UserStore};
use crate::validators;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct LoginResult {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub is_new_user: bool,
}

#[derive(Debug)]
pub struct RefreshResult {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    devices: Arc<dyn DeviceRegistry>,
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn RevocationLedger>,
    otp: Arc<dyn OtpVerifier>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        devices: Arc<dyn DeviceRegistry>,
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn RevocationLedger>,
        otp: Arc<dyn OtpVerifier>,
        tokens: TokenService,
    ) -> Self {
        Self {
            users,
            devices,
            sessions,
            ledger,
            otp,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Send a verification code to a phone number.
    pub async fn send_code(&self, phone_number: &str) -> Result<u32> {
        validators::validate_phone(phone_number)?;

        let expires_in = self.otp.send(phone_number).await?;

        info!(phone = %mask_phone(phone_number), "OTP sent");
        Ok(expires_in)
    }

    /// Complete an OTP login: verify the code, create the user on first
    /// contact, settle device primacy, and open a fresh session lineage.
    pub async fn verify_code(
        &self,
        phone_number: &str,
        code: &str,
        device: &DeviceDescriptor,
    ) -> Result<LoginResult> {
        validators::validate_phone(phone_number)?;
        validators::validate_otp_code(code)?;
        validators::validate_device(device)?;

        // Nothing below runs, and nothing is mutated, on a bad code.
        if !self.otp.check(phone_number, code).await? {
            warn!(phone = %mask_phone(phone_number), "OTP verification failed");
            return Err(ApiError::InvalidOtp);
        }

        let (user, is_new_user) = match self.users.find_by_phone(phone_number).await? {
            Some(user) => {
                self.users.record_login(user.id).await?;
                (user, false)
            }
            None => {
                let user = self.users.create_from_phone(phone_number).await?;
                info!(
                    user_id = %user.id,
                    phone = %mask_phone(phone_number),
                    "User registered via phone"
                );
                (user, true)
            }
        };

        self.settle_primary_device(user.id, device).await?;

        // A device always starts a login with a clean lineage: any live
        // session for this pair is revoked and its tokens blacklisted
        // before the new one is created.
        let swept = self
            .sessions
            .revoke_all_for_device(user.id, &device.device_id)
            .await?;
        self.blacklist_swept(&swept).await;

        let refresh_token = self.tokens.issue_refresh(user.id, &device.device_id)?;
        let expires_at = Utc::now() + Duration::seconds(self.tokens.refresh_ttl_secs());
        self.sessions
            .create(
                user.id,
                &device.device_id,
                &fingerprint(&refresh_token),
                expires_at,
            )
            .await?;

        let access_token = self.tokens.issue_access(user.id, &device.device_id)?;

        info!(
            user_id = %user.id,
            device_id = %device.device_id,
            is_new_user = is_new_user,
            "Login completed"
        );

        Ok(LoginResult {
            user: UserProfile::from(&user),
            access_token,
            refresh_token,
            is_new_user,
        })
    }

    /// Resolve which device is primary after this login.
    ///
    /// Write order matters when a hand-off spans multiple writes: the old
    /// primary's sessions die first, then its flag is cleared, then the new
    /// device is promoted. A crash mid-sequence leaves sessions dead rather
    /// than ownership ambiguous.
    async fn settle_primary_device(&self, user_id: Uuid, device: &DeviceDescriptor) -> Result<()> {
        match self.devices.find_primary(user_id).await? {
            Some(primary) if primary.device_id == device.device_id => {
                // Returning-device login: no device-table changes.
                Ok(())
            }
            Some(old_primary) => {
                info!(
                    user_id = %user_id,
                    old_device = %old_primary.device_id,
                    new_device = %device.device_id,
                    "Primary device hand-off"
                );

                let swept = self
                    .sessions
                    .revoke_all_for_device(user_id, &old_primary.device_id)
                    .await?;
                self.blacklist_swept(&swept).await;

                self.devices
                    .demote_primary(user_id, &old_primary.device_id)
                    .await?;
                self.devices.upsert_primary(user_id, device).await?;
                Ok(())
            }
            None => {
                // First device, or recovery after a wipe: promote directly.
                self.devices.upsert_primary(user_id, device).await?;
                Ok(())
            }
        }
    }

    /// Refresh-rotation protocol. The presented refresh token is single-use:
    /// success retires it and produces exactly one successor; replay of a
    /// retired token kills the whole device lineage.
    pub async fn refresh(&self, presented: &str) -> Result<RefreshResult> {
        let claims = self.tokens.verify(presented, TokenKind::Refresh)?;
        let user_id = claims.user_id()?;
        let device_id = claims.device_id.clone();

        let presented_fp = fingerprint(presented);

        if self.ledger.contains(&presented_fp).await? {
            warn!(
                user_id = %user_id,
                device_id = %device_id,
                "Blacklisted refresh token presented"
            );
            return Err(ApiError::TokenRevoked);
        }

        let next_token = self.tokens.issue_refresh(user_id, &device_id)?;
        let next_fp = fingerprint(&next_token);
        let next_expiry = Utc::now() + Duration::seconds(self.tokens.refresh_ttl_secs());

        // The linchpin: a single conditional update scoped by the exact
        // fingerprint on file. Of two concurrent calls presenting the same
        // token, exactly one matches.
        let matched = self
            .sessions
            .rotate(user_id, &device_id, &presented_fp, &next_fp, next_expiry)
            .await?;

        if !matched {
            // No row carried this fingerprint: the session is gone, revoked,
            // expired, or a newer fingerprint is on file. A legitimate
            // client never re-presents a rotated token, so fail safe and
            // kill the lineage.
            warn!(
                user_id = %user_id,
                device_id = %device_id,
                "Stale refresh token presented - revoking device lineage"
            );

            let swept = self.sessions.revoke_all_for_device(user_id, &device_id).await?;
            self.blacklist_swept(&swept).await;
            self.blacklist_one(&presented_fp, expiry_from_claim(claims.exp))
                .await;

            return Err(ApiError::ReuseDetected);
        }

        // Retire the presented token in the ledger with its natural expiry.
        // A failed write is logged but does not block issuance: the row CAS
        // above already guarantees this token can never rotate again.
        self.blacklist_one(&presented_fp, expiry_from_claim(claims.exp))
            .await;

        let access_token = self.tokens.issue_access(user_id, &device_id)?;

        info!(user_id = %user_id, device_id = %device_id, "Refresh token rotated");

        Ok(RefreshResult {
            access_token,
            refresh_token: next_token,
        })
    }

    /// Logout: end the device's session lineage and mark the device
    /// inactive. The access token simply ages out (15 minutes).
    pub async fn logout(&self, user_id: Uuid, device_id: &str) -> Result<()> {
        let swept = self.sessions.revoke_all_for_device(user_id, device_id).await?;
        self.blacklist_swept(&swept).await;
        self.devices.deactivate(user_id, device_id).await?;

        info!(user_id = %user_id, device_id = %device_id, "Logged out");
        Ok(())
    }

    /// Best-effort `last_seen` stamp when a user's final connection closes.
    pub async fn touch_last_seen(&self, user_id: Uuid, at: DateTime<Utc>) {
        if let Err(err) = self.users.update_last_seen(user_id, at).await {
            warn!(user_id = %user_id, error = %err, "Failed to update last_seen");
        }
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::UserNotFound)?;

        Ok(UserProfile::from(&user))
    }

    async fn blacklist_swept(&self, swept: &[(String, DateTime<Utc>)]) {
        for (fp, expires_at) in swept {
            self.blacklist_one(fp, *expires_at).await;
        }
    }

    async fn blacklist_one(&self, fp: &str, expires_at: DateTime<Utc>) {
        if let Err(err) = self.ledger.insert(fp, expires_at).await {
            error!(error = %err, "Revocation ledger write failed");
        }
    }
}

fn expiry_from_claim(exp: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(exp, 0).single().unwrap_or_else(Utc::now)
}
