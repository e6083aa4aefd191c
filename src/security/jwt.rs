/// JWT issuance and verification
///
/// Two token kinds, each signed with its own HS256 secret: short-lived
/// access tokens (15 minutes) and long-lived refresh tokens (30 days).
/// A kind mismatch fails even when the signature happens to validate,
/// because the embedded `token_type` claim is checked as well.
///
/// Secrets are configuration, loaded once at startup and immutable
/// thereafter.
use crate::config::JwtSettings;
use crate::error::{ApiError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT claims binding a token to (user, device, kind).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User ID as UUID string
    pub sub: String,
    /// Client-supplied device identifier
    pub device_id: String,
    /// Token kind: "access" or "refresh"
    pub token_type: String,
    /// Unique token ID. `iat`/`exp` have second granularity, so without
    /// this two tokens minted in the same second for the same (user,
    /// device) would serialize identically and share a fingerprint,
    /// breaking refresh single-use.
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| ApiError::InvalidToken)
    }
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Stateless token service. Cheap to clone; the key material is shared.
#[derive(Clone)]
pub struct TokenService {
    access: Arc<KindKeys>,
    refresh: Arc<KindKeys>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            access: Arc::new(KindKeys {
                encoding: EncodingKey::from_secret(settings.access_secret.as_bytes()),
                decoding: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            }),
            refresh: Arc::new(KindKeys {
                encoding: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
                decoding: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            }),
            access_ttl_secs: settings.access_ttl_secs,
            refresh_ttl_secs: settings.refresh_ttl_secs,
        }
    }

    pub fn issue_access(&self, user_id: Uuid, device_id: &str) -> Result<String> {
        self.issue(TokenKind::Access, user_id, device_id, self.access_ttl_secs)
    }

    pub fn issue_refresh(&self, user_id: Uuid, device_id: &str) -> Result<String> {
        self.issue(TokenKind::Refresh, user_id, device_id, self.refresh_ttl_secs)
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    fn issue(&self, kind: TokenKind, user_id: Uuid, device_id: &str, ttl_secs: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            device_id: device_id.to_string(),
            token_type: kind.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(token)
    }

    /// Verify a token against the expected kind's secret.
    ///
    /// Fails with `TokenExpired` past expiry, `InvalidToken` on a bad
    /// signature or structure, and `WrongTokenKind` when the embedded kind
    /// does not match `expected`.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.keys(expected).decoding, &validation)?;

        if data.claims.token_type != expected.as_str() {
            return Err(ApiError::WrongTokenKind);
        }

        Ok(data.claims)
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    #[cfg(test)]
    pub(crate) fn issue_with_ttl(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        device_id: &str,
        ttl_secs: i64,
    ) -> Result<String> {
        self.issue(kind, user_id, device_id, ttl_secs)
    }
}

/// One-way fingerprint of a token, used for storage and equality checks
/// only. Hex-encoded SHA-256, never reversible.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
