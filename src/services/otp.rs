/// OTP delivery and verification
///
/// Production path delegates to the Twilio Verify API (Twilio owns code
/// generation, storage and expiry). When Twilio is unconfigured the dev
/// verifier stores the code in Redis and logs it instead of sending SMS.
///
/// Both paths share a Redis send-rate limit: max 5 codes per phone per
/// hour.
use crate::error::{ApiError, Result};
use crate::store::OtpVerifier;
use crate::SharedConnectionManager;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// OTP code length
const OTP_LENGTH: usize = 6;

/// OTP expiration time in seconds (5 minutes)
const OTP_EXPIRY_SECS: u32 = 300;

/// Max OTP sends per phone per hour
const MAX_OTP_SENDS_PER_HOUR: i32 = 5;

const REDIS_OTP_PREFIX: &str = "courier:phone_otp:";
const REDIS_RATE_LIMIT_PREFIX: &str = "courier:phone_rate:";

/// Mask a phone number for logging, keeping only the last four characters.
/// Counts chars, not bytes, so arbitrary input cannot split a codepoint.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    format!("****{}", chars[chars.len() - 4..].iter().collect::<String>())
}

async fn enforce_send_rate_limit(redis: &SharedConnectionManager, phone_number: &str) -> Result<()> {
    let key = format!("{}{}", REDIS_RATE_LIMIT_PREFIX, phone_number);
    let mut conn = redis.lock().await.clone();

    let count: i32 = redis::cmd("INCR")
        .arg(&key)
        .query_async(&mut conn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to update OTP rate limit");
            ApiError::Redis(e.to_string())
        })?;

    if count == 1 {
        // First send in the window starts the one-hour clock.
        let _: std::result::Result<i32, _> = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(3600)
            .query_async(&mut conn)
            .await;
    }

    if count > MAX_OTP_SENDS_PER_HOUR {
        warn!(
            phone = %mask_phone(phone_number),
            count = count,
            "OTP send rate limit exceeded"
        );
        return Err(ApiError::RateLimited(
            "Too many verification code requests. Please try again later.".to_string(),
        ));
    }

    Ok(())
}

// ============================================================================
// Twilio Verify
// ============================================================================

#[derive(Clone)]
pub struct TwilioVerifier {
    client: Client,
    account_sid: String,
    auth_token: String,
    verify_service_sid: String,
    redis: SharedConnectionManager,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct VerificationCheckResponse {
    status: String,
}

impl TwilioVerifier {
    pub fn new(
        account_sid: String,
        auth_token: String,
        verify_service_sid: String,
        redis: SharedConnectionManager,
    ) -> Self {
        Self {
            client: Client::new(),
            account_sid,
            auth_token,
            verify_service_sid,
            redis,
        }
    }
}

#[async_trait]
impl OtpVerifier for TwilioVerifier {
    async fn send(&self, phone_number: &str) -> Result<u32> {
        enforce_send_rate_limit(&self.redis, phone_number).await?;

        let url = format!(
            "https://verify.twilio.com/v2/Services/{}/Verifications",
            self.verify_service_sid
        );

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("To", phone_number.to_string());
        form.insert("Channel", "sms".to_string());

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::OtpProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(
                phone = %mask_phone(phone_number),
                status = %status,
                body = %body,
                "Twilio Verify send failed"
            );
            return Err(ApiError::OtpProvider(format!(
                "Twilio returned {}",
                status
            )));
        }

        let verification: VerificationResponse = response
            .json()
            .await
            .map_err(|e| ApiError::OtpProvider(e.to_string()))?;

        info!(
            phone = %mask_phone(phone_number),
            status = %verification.status,
            "Verification code sent"
        );

        Ok(OTP_EXPIRY_SECS)
    }

    async fn check(&self, phone_number: &str, code: &str) -> Result<bool> {
        let url = format!(
            "https://verify.twilio.com/v2/Services/{}/VerificationCheck",
            self.verify_service_sid
        );

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("To", phone_number.to_string());
        form.insert("Code", code.to_string());

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::OtpProvider(e.to_string()))?;

        // Twilio answers 404 for a check against an expired or unknown
        // verification; that is a failed check, not a provider outage.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        if !response.status().is_success() {
            let status = response.status();
            error!(
                phone = %mask_phone(phone_number),
                status = %status,
                "Twilio Verify check failed"
            );
            return Err(ApiError::OtpProvider(format!(
                "Twilio returned {}",
                status
            )));
        }

        let check: VerificationCheckResponse = response
            .json()
            .await
            .map_err(|e| ApiError::OtpProvider(e.to_string()))?;

        Ok(check.status == "approved")
    }
}

// ============================================================================
// Development fallback
// ============================================================================

/// Redis-backed verifier for local development: codes are generated here,
/// stored with a TTL, and logged instead of delivered.
#[derive(Clone)]
pub struct DevOtpVerifier {
    redis: SharedConnectionManager,
}

impl DevOtpVerifier {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        (0..OTP_LENGTH)
            .map(|_| rng.gen_range(0..10).to_string())
            .collect()
    }
}

#[async_trait]
impl OtpVerifier for DevOtpVerifier {
    async fn send(&self, phone_number: &str) -> Result<u32> {
        enforce_send_rate_limit(&self.redis, phone_number).await?;

        let code = Self::generate_code();
        let key = format!("{}{}", REDIS_OTP_PREFIX, phone_number);
        let mut conn = self.redis.lock().await.clone();

        redis::cmd("SETEX")
            .arg(&key)
            .arg(OTP_EXPIRY_SECS)
            .arg(&code)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to store OTP in Redis");
                ApiError::Redis(e.to_string())
            })?;

        warn!(
            phone = %mask_phone(phone_number),
            otp = %code,
            "SMS provider not configured - OTP logged for development"
        );

        Ok(OTP_EXPIRY_SECS)
    }

    async fn check(&self, phone_number: &str, code: &str) -> Result<bool> {
        let key = format!("{}{}", REDIS_OTP_PREFIX, phone_number);
        let mut conn = self.redis.lock().await.clone();

        let stored: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| ApiError::Redis(e.to_string()))?;

        match stored {
            Some(stored) if stored == code => {
                // Single-use: delete on success.
                redis::cmd("DEL")
                    .arg(&key)
                    .query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(|e| ApiError::Redis(e.to_string()))?;
                Ok(true)
            }
            Some(_) => {
                warn!(phone = %mask_phone(phone_number), "Invalid OTP code attempt");
                Ok(false)
            }
            None => {
                warn!(phone = %mask_phone(phone_number), "OTP code expired or not found");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+15551234567"), "****4567");
        assert_eq!(mask_phone("+155"), "****");
        // Multi-byte input must not split a codepoint.
        assert_eq!(mask_phone("číslo+420123"), "****0123");
        assert_eq!(mask_phone("☎☎☎"), "****");
    }

    #[test]
    fn test_generated_code_shape() {
        let code = DevOtpVerifier::generate_code();
        assert_eq!(code.len(), OTP_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
