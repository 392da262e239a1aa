//! Repository for the `runtime_flags` table.

use sqlx::PgPool;

pub struct RuntimeFlagRepo;

impl RuntimeFlagRepo {
    pub async fn upsert(pool: &PgPool, flag: &str, value: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO runtime_flags (flag, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (flag) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(flag)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, flag: &str) -> Result<Option<bool>, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT value FROM runtime_flags WHERE flag = $1")
            .bind(flag)
            .fetch_optional(pool)
            .await
    }
}
