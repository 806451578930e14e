//! Server-side login sessions.

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor, SqlitePool};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    /// Unix seconds
    pub expires_at: i64,
}

/// The identity behind a live session
#[derive(Debug, Clone, FromRow)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

impl Session {
    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Session, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(db)
            .await?;

        Ok(Session {
            id,
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
        })
    }

    /// Resolve an unexpired session to its user
    pub async fn find_user(
        db: &SqlitePool,
        token_hash: &str,
        now: i64,
    ) -> Result<Option<SessionUser>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT s.user_id AS user_id, COALESCE(u.username, '') AS username
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(db)
        .await
    }

    pub async fn delete_by_token_hash(db: &SqlitePool, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_user(db: &SqlitePool, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected())
    }

    /// End every session of `user_id` except the one hashed as `keep`
    pub async fn delete_others_for_user<'e, E>(
        executor: E,
        user_id: i64,
        keep: Option<&str>,
    ) -> Result<u64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND token_hash IS NOT ?")
            .bind(user_id)
            .bind(keep)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn purge_expired(db: &SqlitePool, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(db)
            .await?;

        Ok(result.rows_affected())
    }
}
