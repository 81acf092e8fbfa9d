use crate::adapters::database::DbPool;
use crate::error::{AppError, Result};
use crate::services::session_store::SessionStore;
use async_trait::async_trait;
use sqlx::PgConnection;
use time::OffsetDateTime;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed session store over the `sessions` table.
///
/// Mutations that must not interleave for the same user (`establish`, `replace`) run in a
/// transaction holding a per-user advisory lock. The unique index on `name` backs the
/// one-session-per-user rule.
#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Blocks until this transaction owns the lock for `user_name`. Released on commit or rollback.
    async fn lock_user(conn: &mut PgConnection, user_name: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(user_name)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn insert(&self, user_name: &str, token_hash: &str, created_at: OffsetDateTime) -> Result<()> {
        sqlx::query("INSERT INTO sessions (name, refresh_token, created_time) VALUES ($1, $2, $3)")
            .bind(user_name)
            .bind(token_hash)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                {
                    return AppError::DuplicateSession(user_name.to_string());
                }
                AppError::Database(e)
            })?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete_by_user(&self, user_name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE name = $1")
            .bind(user_name)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn count(&self, user_name: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE name = $1")
            .bind(user_name)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(count)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_hash(&self, user_name: &str) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT refresh_token FROM sessions WHERE name = $1")
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(hash)
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn created_at(&self, token_hash: &str, user_name: &str) -> Result<Option<OffsetDateTime>> {
        let created_at = sqlx::query_scalar::<_, OffsetDateTime>(
            "SELECT created_time FROM sessions WHERE refresh_token = $1 AND name = $2",
        )
        .bind(token_hash)
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(created_at)
    }

    #[tracing::instrument(level = "debug", skip(self, old_hash, new_hash), err)]
    async fn replace(
        &self,
        user_name: &str,
        old_hash: &str,
        new_hash: &str,
        created_at: OffsetDateTime,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, user_name).await?;

        let swapped = sqlx::query_scalar::<_, String>(
            r"
            WITH deleted AS (
                DELETE FROM sessions
                WHERE name = $1 AND refresh_token = $2
                RETURNING name
            )
            INSERT INTO sessions (name, refresh_token, created_time)
            SELECT name, $3, $4
            FROM deleted
            RETURNING name
            ",
        )
        .bind(user_name)
        .bind(old_hash)
        .bind(new_hash)
        .bind(created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await?;

        Ok(swapped.is_some())
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn establish(&self, user_name: &str, token_hash: &str, created_at: OffsetDateTime) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, user_name).await?;

        let purged = sqlx::query("DELETE FROM sessions WHERE name = $1")
            .bind(user_name)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .rows_affected();

        sqlx::query("INSERT INTO sessions (name, refresh_token, created_time) VALUES ($1, $2, $3)")
            .bind(user_name)
            .bind(token_hash)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await?;

        Ok(purged)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete_created_before(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE created_time < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(())
    }
}
