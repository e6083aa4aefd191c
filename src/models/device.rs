use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Device row. `device_id` is a client-supplied opaque identifier, unique
/// per user. At most one device per user carries `is_primary = true`; the
/// flag is reassigned, never duplicated.
#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: String,
    pub device_name: String,
    pub is_primary: bool,
    pub is_active: bool,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-supplied device descriptor presented at login.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    #[validate(length(min = 1, max = 128))]
    pub device_id: String,
    #[validate(length(min = 1, max = 32))]
    pub platform: String,
    #[validate(length(min = 1, max = 128))]
    pub device_name: String,
}
