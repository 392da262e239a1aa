//! Repository for the `user_sessions` table.

use forgewatch_core::security::Session;
use forgewatch_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::security::SessionRow;

/// Column list shared by SELECT and INSERT.
const COLUMNS: &str = "\
    id, user_id, session_token, ip_address, user_agent, is_active, \
    last_activity, created_at, expires_at";

pub struct SessionRepo;

impl SessionRepo {
    pub async fn insert(pool: &PgPool, session: &Session) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        sqlx::query(&query)
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(&session.session_token)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(session.is_active)
            .bind(session.last_activity)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Active, unexpired session by token.
    pub async fn find_valid(
        pool: &PgPool,
        token: &str,
        now: Timestamp,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions \
             WHERE session_token = $1 AND is_active AND expires_at >= $2"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(token)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    pub async fn touch(pool: &PgPool, token: &str, now: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET last_activity = $2 \
             WHERE session_token = $1 AND is_active",
        )
        .bind(token)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deactivate(
        pool: &PgPool,
        token: &str,
        user_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE \
             WHERE session_token = $1 AND ($2::text IS NULL OR user_id = $2)",
        )
        .bind(token)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deactivate_all(
        pool: &PgPool,
        user_id: &str,
        except_token: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE \
             WHERE user_id = $1 AND is_active \
               AND ($2::text IS NULL OR session_token <> $2)",
        )
        .bind(user_id)
        .bind(except_token)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Sessions of a user, most recently active first. When `valid_at` is set
    /// only active sessions unexpired at that instant are returned.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
        valid_at: Option<Timestamp>,
        limit: Option<i64>,
    ) -> Result<Vec<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions \
             WHERE user_id = $1 \
               AND ($2::timestamptz IS NULL OR (is_active AND expires_at >= $2)) \
             ORDER BY last_activity DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(user_id)
            .bind(valid_at)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn deactivate_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE WHERE is_active AND expires_at < $1",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
