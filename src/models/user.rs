use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User row. The phone number is the identity anchor; a user is created on
/// the first successful OTP verification for that number and never
/// hard-deleted here.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub is_phone_verified: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile projection returned by the API. Never includes token material.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub is_phone_verified: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            phone_number: user.phone_number.clone(),
            display_name: user.display_name.clone(),
            about: user.about.clone(),
            is_phone_verified: user.is_phone_verified,
            last_seen: user.last_seen,
        }
    }
}
