//! User accounts and credentials.

use sqlx::{FromRow, SqliteExecutor, SqlitePool};

const USER_COLUMNS: &str = r#"
    id,
    COALESCE(username, '') AS username,
    COALESCE(email, '') AS email,
    COALESCE(password, '') AS password,
    COALESCE(security_question, '') AS security_question,
    COALESCE(security_answer, '') AS security_answer
"#;

/// A registered user. `password` and `security_answer` hold hashes, never
/// the secrets themselves.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub security_question: String,
    pub security_answer: String,
}

/// Fields needed to insert a user; secrets are already hashed.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub security_question: &'a str,
    pub security_answer_hash: &'a str,
}

impl User {
    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(db)
            .await
    }

    /// Look a user up by email or username. Usernames are not unique, so the
    /// oldest matching account wins, and an email match beats a username match.
    pub async fn find_by_login(
        db: &SqlitePool,
        identifier: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE email = ? OR username = ?
            ORDER BY (email = ?) DESC, id ASC
            LIMIT 1
            "#,
            USER_COLUMNS
        ))
        .bind(identifier)
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(db)
        .await
    }

    pub async fn email_exists(db: &SqlitePool, email: &str) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(found.is_some())
    }

    /// Insert a user and return its id
    pub async fn create(db: &SqlitePool, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password, security_question, security_answer)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.security_question)
        .bind(user.security_answer_hash)
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update_password<'e, E>(
        executor: E,
        id: i64,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_security_answer(
        db: &SqlitePool,
        id: i64,
        answer_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET security_answer = ? WHERE id = ?")
            .bind(answer_hash)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Users whose security answer is still stored in clear text
    pub async fn list_plaintext_answers(db: &SqlitePool) -> Result<Vec<(i64, String)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, security_answer
            FROM users
            WHERE security_answer IS NOT NULL
              AND security_answer != ''
              AND security_answer NOT LIKE '$argon2%'
            "#,
        )
        .fetch_all(db)
        .await
    }
}
