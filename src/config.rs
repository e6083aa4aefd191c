//! Configuration management
//!
//! Settings are loaded from environment variables, with a `.env` file picked
//! up in debug builds for local development.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub twilio: TwilioSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            server: ServerSettings::from_env()?,
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            twilio: TwilioSettings::from_env(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout_secs: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
        })
    }
}

/// JWT signing settings. One secret per token kind; both are loaded once at
/// startup and never rotated at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_secret: env::var("JWT_ACCESS_SECRET")
                .context("JWT_ACCESS_SECRET must be set")?,
            refresh_secret: env::var("JWT_REFRESH_SECRET")
                .context("JWT_REFRESH_SECRET must be set")?,
            // 15 minutes
            access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid JWT_ACCESS_TTL_SECS")?,
            // 30 days
            refresh_ttl_secs: env::var("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "2592000".to_string())
                .parse()
                .context("Invalid JWT_REFRESH_TTL_SECS")?,
        })
    }
}

/// Twilio Verify settings. When unset the server falls back to a
/// development verifier that stores codes in Redis and logs them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub verify_service_sid: Option<String>,
}

impl TwilioSettings {
    fn from_env() -> Self {
        Self {
            account_sid: env::var("TWILIO_ACCOUNT_SID").ok(),
            auth_token: env::var("TWILIO_AUTH_TOKEN").ok(),
            verify_service_sid: env::var("TWILIO_VERIFY_SERVICE_SID").ok(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.verify_service_sid.is_some()
    }
}
