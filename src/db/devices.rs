/// Device database operations
///
/// A partial unique index (`devices_one_primary_per_user`) backs the
/// one-primary-per-user invariant: promoting a second primary without first
/// demoting the old one is a constraint violation, not silent corruption.
use crate::error::Result;
use crate::models::{Device, DeviceDescriptor};
use crate::store::DeviceRegistry;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const DEVICE_COLUMNS: &str = "id, user_id, device_id, platform, device_name, \
                              is_primary, is_active, last_active_at, created_at, updated_at";

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn find(&self, user_id: Uuid, device_id: &str) -> Result<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = $1 AND device_id = $2"
        ))
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn find_primary(&self, user_id: Uuid) -> Result<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = $1 AND is_primary"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn upsert_primary(&self, user_id: Uuid, descriptor: &DeviceDescriptor) -> Result<Device> {
        let now = Utc::now();

        let device = sqlx::query_as::<_, Device>(&format!(
            r#"
            INSERT INTO devices (id, user_id, device_id, platform, device_name,
                                 is_primary, is_active, last_active_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, TRUE, $6, $6, $6)
            ON CONFLICT (user_id, device_id) DO UPDATE
            SET platform = EXCLUDED.platform,
                device_name = EXCLUDED.device_name,
                is_primary = TRUE,
                is_active = TRUE,
                last_active_at = EXCLUDED.last_active_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&descriptor.device_id)
        .bind(&descriptor.platform)
        .bind(&descriptor.device_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(device)
    }

    async fn demote_primary(&self, user_id: Uuid, device_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET is_primary = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid, device_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET is_active = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
