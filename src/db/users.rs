/// User database operations
use crate::error::Result;
use crate::models::User;
use crate::store::UserStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, display_name, about, is_phone_verified,
                   last_seen, created_at, updated_at
            FROM users
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_from_phone(&self, phone_number: &str) -> Result<User> {
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, phone_number, is_phone_verified, created_at, updated_at)
            VALUES ($1, $2, TRUE, $3, $3)
            RETURNING id, phone_number, display_name, about, is_phone_verified,
                      last_seen, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone_number)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, display_name, about, is_phone_verified,
                   last_seen, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_last_seen(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_seen = $2, updated_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
