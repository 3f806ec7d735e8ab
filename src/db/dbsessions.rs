use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Participant, Role, Tier};
use crate::services::repository::{anonymous_display_name, MessageRole, RepoError, Repository};

/// Postgres-backed session repository.
///
/// Tables used: `sessions`, `session_participants`,
/// `anonymous_participants`, `invite_tokens`, `session_messages` and
/// `users`.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Host of an active session, or `NotFound`.
    async fn active_session_host(&self, session_id: Uuid) -> Result<Uuid, RepoError> {
        let row = sqlx::query("SELECT host_user_id FROM sessions WHERE id = $1 AND is_active = true")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("host_user_id")?),
            None => Err(RepoError::NotFound),
        }
    }

    async fn user_profile(&self, user_id: Uuid) -> Result<(Option<String>, Tier), RepoError> {
        let row = sqlx::query("SELECT name, tier FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => {
                let name: Option<String> = row.try_get("name")?;
                let tier: Option<String> = row.try_get("tier")?;
                (name, Tier::from_str_lossy(tier.as_deref().unwrap_or("")))
            }
            None => (None, Tier::Free),
        })
    }

    async fn active_membership(&self, session_id: Uuid, user_id: Uuid) -> Result<Option<Role>, RepoError> {
        let row = sqlx::query(
            "SELECT role FROM session_participants \
             WHERE session_id = $1 AND user_id = $2 AND status = 'active'",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let role: String = row.try_get("role")?;
                Ok(Some(parse_role(&role)))
            }
            None => Ok(None),
        }
    }

    /// Atomically consume one use of `token` and return the granted role.
    async fn redeem_invite<'e, E>(executor: E, session_id: Uuid, token: Option<&str>) -> Result<Role, RepoError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let token = token.filter(|t| !t.is_empty()).ok_or(RepoError::Forbidden)?;
        let row = sqlx::query(
            "UPDATE invite_tokens SET uses_count = uses_count + 1 \
             WHERE token = $1 AND session_id = $2 \
               AND (expires_at IS NULL OR expires_at > NOW()) \
               AND (max_uses IS NULL OR uses_count < max_uses) \
             RETURNING role",
        )
        .bind(token)
        .bind(session_id)
        .fetch_optional(executor)
        .await?;
        match row {
            Some(row) => {
                let role: String = row.try_get("role")?;
                Ok(parse_role(&role))
            }
            None => Err(RepoError::Forbidden),
        }
    }
}

/// Ids are UUIDs in the database; anything else cannot match a row.
fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

fn parse_role(raw: &str) -> Role {
    Role::parse(raw).unwrap_or_else(|| {
        warn!("Unknown participant role '{}' in database, treating as viewer", raw);
        Role::Viewer
    })
}

#[async_trait]
impl Repository for PgRepository {
    async fn get_authenticated_participant(
        &self,
        session_id: &str,
        user_id: &str,
        invite: Option<&str>,
    ) -> Result<Participant, RepoError> {
        let session_uuid = parse_id(session_id).ok_or(RepoError::NotFound)?;
        let user_uuid = parse_id(user_id).ok_or(RepoError::Forbidden)?;

        let host = self.active_session_host(session_uuid).await?;
        let (name, tier) = self.user_profile(user_uuid).await?;
        let display_name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| user_id.to_string());

        let role = if host == user_uuid {
            Role::Host
        } else if let Some(role) = self.active_membership(session_uuid, user_uuid).await? {
            role
        } else {
            let mut tx = self.pool.begin().await?;
            let role = Self::redeem_invite(&mut *tx, session_uuid, invite).await?;
            sqlx::query(
                "INSERT INTO session_participants (id, session_id, user_id, display_name, role, status, joined_at) \
                 VALUES ($1, $2, $3, $4, $5, 'active', NOW()) \
                 ON CONFLICT (session_id, user_id) \
                 DO UPDATE SET role = EXCLUDED.role, status = 'active', left_at = NULL",
            )
            .bind(Uuid::new_v4())
            .bind(session_uuid)
            .bind(user_uuid)
            .bind(&display_name)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            debug!(session = %session_id, user = %user_id, role = %role, "Invite redeemed");
            role
        };

        Ok(Participant {
            user_id: Some(user_id.to_string()),
            display_name,
            role,
            tier,
        })
    }

    async fn add_anonymous_participant(
        &self,
        session_id: &str,
        display_name: &str,
        invite: Option<&str>,
    ) -> Result<Participant, RepoError> {
        let session_uuid = parse_id(session_id).ok_or(RepoError::NotFound)?;
        self.active_session_host(session_uuid).await?;
        let display_name = anonymous_display_name(Some(display_name));

        let mut tx = self.pool.begin().await?;
        let role = Self::redeem_invite(&mut *tx, session_uuid, invite).await?;
        sqlx::query(
            "INSERT INTO anonymous_participants (id, session_id, display_name, role, status, joined_at, expires_at) \
             VALUES ($1, $2, $3, $4, 'active', NOW(), NOW() + INTERVAL '24 hours')",
        )
        .bind(Uuid::new_v4())
        .bind(session_uuid)
        .bind(&display_name)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Participant {
            user_id: None,
            display_name,
            role,
            tier: Tier::Free,
        })
    }

    async fn get_session_code(&self, session_id: &str) -> Result<String, RepoError> {
        let session_uuid = parse_id(session_id).ok_or(RepoError::NotFound)?;
        let row = sqlx::query("SELECT code FROM sessions WHERE id = $1 AND is_active = true")
            .bind(session_uuid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
        let code: Option<String> = row.try_get("code")?;
        Ok(code.unwrap_or_default())
    }

    async fn update_session_code(&self, session_id: &str, code: &str) -> Result<(), RepoError> {
        let session_uuid = parse_id(session_id).ok_or(RepoError::NotFound)?;
        let result = sqlx::query(
            "UPDATE sessions SET code = $2, last_activity = NOW() WHERE id = $1 AND is_active = true",
        )
        .bind(session_uuid)
        .bind(code)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn add_message(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepoError> {
        let session_uuid = parse_id(session_id).ok_or(RepoError::NotFound)?;
        sqlx::query(
            "INSERT INTO session_messages (id, session_id, user_id, role, message_type, content, created_at) \
             VALUES ($1, $2, $3, $4, $4, $5, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(session_uuid)
        .bind(user_id.and_then(parse_id))
        .bind(role.as_str())
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_last_activity(&self, session_id: &str) -> Result<(), RepoError> {
        let session_uuid = parse_id(session_id).ok_or(RepoError::NotFound)?;
        sqlx::query("UPDATE sessions SET last_activity = NOW() WHERE id = $1")
            .bind(session_uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
