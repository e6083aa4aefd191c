/// Session database operations
///
/// `rotate` is the conditional-update-as-lock: one UPDATE scoped by the
/// exact fingerprint on file stands in for a mutex. Whether any row matched
/// is the whole answer; there is no read-then-write anywhere in this path.
use crate::error::Result;
use crate::models::Session;
use crate::store::SessionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, device_id, refresh_token_hash, expires_at, \
                               last_used_at, revoked, version, created_at, updated_at";

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn revoke_all_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>> {
        let fingerprints: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE sessions
            SET revoked = TRUE, updated_at = NOW()
            WHERE user_id = $1 AND device_id = $2 AND NOT revoked
            RETURNING refresh_token_hash, expires_at
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fingerprints)
    }

    async fn create(
        &self,
        user_id: Uuid,
        device_id: &str,
        fingerprint: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let now = Utc::now();

        // One row per (user, device): a new login replaces the old lineage,
        // which the orchestrator has already revoked and blacklisted.
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (id, user_id, device_id, refresh_token_hash,
                                  expires_at, last_used_at, revoked, version,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, 0, $6, $6)
            ON CONFLICT (user_id, device_id) DO UPDATE
            SET refresh_token_hash = EXCLUDED.refresh_token_hash,
                expires_at = EXCLUDED.expires_at,
                last_used_at = EXCLUDED.last_used_at,
                revoked = FALSE,
                version = 0,
                updated_at = EXCLUDED.updated_at
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(device_id)
        .bind(fingerprint)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        device_id: &str,
        presented_fp: &str,
        next_fp: &str,
        next_expiry: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET refresh_token_hash = $4,
                version = version + 1,
                expires_at = $5,
                last_used_at = NOW(),
                updated_at = NOW()
            WHERE user_id = $1
              AND device_id = $2
              AND refresh_token_hash = $3
              AND NOT revoked
              AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .bind(presented_fp)
        .bind(next_fp)
        .bind(next_expiry)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, user_id: Uuid, device_id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND device_id = $2"
        ))
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }
}
