mod models;

pub use models::*;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type DbPool = SqlitePool;

/// Split a SQL migration file into statements, dropping comment lines
fn sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|statement| {
            statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql_statements(sql) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

/// Execute a table-rebuild migration as a single transaction.
///
/// Foreign key enforcement is off while tables are swapped, as SQLite requires
/// for rebuilds, and restored on the same connection afterwards.
async fn execute_rebuild(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut conn = pool.acquire().await?;
    sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await?;
    let result = execute_in_transaction(&mut conn, sql).await;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
    result
}

async fn execute_in_transaction(conn: &mut SqliteConnection, sql: &str) -> Result<()> {
    let mut tx = conn.begin().await?;
    for statement in sql_statements(sql) {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("tallybook.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Declared type of a column, upper-cased. None if the column is missing.
async fn column_type(pool: &SqlitePool, table: &str, column: &str) -> Result<Option<String>> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT type FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_optional(pool)
            .await?;
    Ok(found.map(|(ty,)| ty.to_uppercase()))
}

async fn has_text_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    Ok(column_type(pool, table, column).await?.as_deref() == Some("TEXT"))
}

async fn has_table(pool: &SqlitePool, table: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Create the schema if absent and bring older databases forward.
///
/// Every step is additive and guarded, so running this on every startup is safe.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Initial schema
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Alert thresholds on user_settings
    if !has_column(pool, "user_settings", "income_min_alert").await? {
        execute_sql(pool, include_str!("../../migrations/002_income_min_alert.sql")).await?;
    }
    if !has_column(pool, "user_settings", "income_max_alert").await? {
        execute_sql(pool, include_str!("../../migrations/003_income_max_alert.sql")).await?;
    }

    // Migration 004: Explicit salary flag on categories
    if !has_column(pool, "categories", "is_salary").await? {
        execute_rebuild(pool, include_str!("../../migrations/004_salary_flag.sql")).await?;
    }

    // Migration 005: Server-side sessions
    if !has_table(pool, "sessions").await? {
        execute_sql(pool, include_str!("../../migrations/005_sessions.sql")).await?;
    }

    // Migration 006: Decimal strings instead of REAL for money columns
    if !has_text_column(pool, "transactions", "amount").await?
        || !has_text_column(pool, "user_settings", "default_saving").await?
    {
        execute_rebuild(pool, include_str!("../../migrations/006_decimal_text.sql")).await?;
    }

    // Security answers written before hashing was introduced
    let rehashed = migrate_plaintext_answers(pool).await?;
    if rehashed > 0 {
        info!(count = rehashed, "Hashed plaintext security answers");
    }

    info!("Migrations completed");
    Ok(())
}

async fn migrate_plaintext_answers(pool: &SqlitePool) -> Result<usize> {
    let pending = User::list_plaintext_answers(pool).await?;
    let count = pending.len();

    for (user_id, answer) in pending {
        let hash = crate::api::auth::hash_security_answer(&answer)
            .map_err(|e| anyhow::anyhow!("Failed to hash security answer: {}", e))?;
        User::update_security_answer(pool, user_id, &hash).await?;
    }

    Ok(count)
}

/// In-memory database for tests. A single connection keeps every query on the
/// same memory database.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        assert!(has_column(&pool, "user_settings", "income_max_alert").await.unwrap());
        assert!(has_column(&pool, "categories", "is_salary").await.unwrap());
        assert!(has_table(&pool, "sessions").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_schema_is_upgraded_without_data_loss() {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        // Shape of a database created before alerts, salary flags and sessions existed,
        // with the scratch table of an interrupted upgrade left behind
        execute_sql(
            &pool,
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT, email TEXT UNIQUE, password TEXT,
                security_question TEXT, security_answer TEXT
            );
            CREATE TABLE categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER, name TEXT,
                type TEXT CHECK(type IN ('รายรับ','รายจ่าย')),
                UNIQUE(user_id, name)
            );
            CREATE TABLE transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER, category_id INTEGER, amount REAL, note TEXT, date TIMESTAMP
            );
            CREATE TABLE user_settings (
                user_id INTEGER PRIMARY KEY,
                default_saving REAL DEFAULT 0,
                saving_percent REAL DEFAULT 0
            );
            CREATE TABLE categories_v2 (leftover TEXT);
            INSERT INTO users (username, email, password, security_question, security_answer)
                VALUES ('alice', 'alice@example.com', 'x', 'Pet?', 'Rex');
            INSERT INTO categories (user_id, name, type) VALUES (1, 'เงินเดือน', 'รายรับ');
            INSERT INTO categories (user_id, name, type) VALUES (1, 'Rent', 'รายจ่าย');
            INSERT INTO categories (user_id, name, type) VALUES (1, 'Misc', NULL);
            INSERT INTO categories (user_id, name, type) VALUES (42, 'Orphan', 'รายรับ');
            INSERT INTO transactions (user_id, category_id, amount, note, date)
                VALUES (1, 1, 2000.0, 'pay', '2024-01-31 09:00:00.000000');
            INSERT INTO transactions (user_id, category_id, amount, note, date)
                VALUES (1, 3, 15.5, NULL, '2024-02-01 10:00:00');
            INSERT INTO user_settings (user_id, default_saving, saving_percent) VALUES (1, 500, 10);
            "#,
        )
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        let settings = UserSettings::get_or_create(&pool, 1).await.unwrap();
        assert_eq!(settings.default_saving, rust_decimal::Decimal::from(500));
        assert_eq!(settings.income_min_alert, rust_decimal::Decimal::ZERO);

        let categories = Category::list_for_user(&pool, 1).await.unwrap();
        assert_eq!(categories.len(), 3);
        let salary = categories.iter().find(|c| c.id == 1).unwrap();
        assert_eq!(salary.kind, CategoryKind::Income);
        assert!(salary.is_salary);
        let rent = categories.iter().find(|c| c.id == 2).unwrap();
        assert_eq!(rent.kind, CategoryKind::Expense);
        assert!(!rent.is_salary);

        // A kind the old CHECK let through as NULL is kept as an expense
        let misc = categories.iter().find(|c| c.id == 3).unwrap();
        assert_eq!(misc.kind, CategoryKind::Expense);

        // Rows of missing users survive too
        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE user_id = 42")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphans, 1);

        let offset = chrono::FixedOffset::east_opt(7 * 3600).unwrap();
        let lines = Transaction::ledger_lines(&pool, 1, offset).await.unwrap();
        assert_eq!(lines.len(), 2);
        let pay = lines.iter().find(|l| l.is_salary).unwrap();
        assert_eq!(pay.amount, rust_decimal::Decimal::from(2000));
        let history = Transaction::history(&pool, 1, offset).await.unwrap();
        assert!(history.iter().any(|h| h.amount == rust_decimal::Decimal::new(155, 1)));

        // Money columns now keep decimal strings exact
        assert!(has_text_column(&pool, "transactions", "amount").await.unwrap());
        assert!(has_text_column(&pool, "user_settings", "income_min_alert").await.unwrap());
        let exact: rust_decimal::Decimal = "12345678901234567.89".parse().unwrap();
        let id = Transaction::create(&pool, 1, 2, exact, "", offset.timestamp_opt(0, 0).unwrap())
            .await
            .unwrap();
        let stored = Transaction::get_by_id(&pool, id, offset).await.unwrap().unwrap();
        assert_eq!(stored.amount, exact);
        let storage: String = sqlx::query_scalar("SELECT typeof(amount) FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(storage, "text");

        // Running again is a no-op
        run_migrations(&pool).await.unwrap();
        assert_eq!(Category::list_for_user(&pool, 1).await.unwrap().len(), 3);

        let user = User::find_by_email(&pool, "alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.security_answer.starts_with("$argon2"));
        assert!(crate::api::auth::verify_security_answer("rex", &user.security_answer));
    }

    #[tokio::test]
    async fn test_failed_rebuild_leaves_schema_untouched() {
        let pool = test_pool().await;

        let result = execute_rebuild(
            &pool,
            "CREATE TABLE categories_v2 (id INTEGER); DROP TABLE categories; INSERT INTO missing VALUES (1)",
        )
        .await;
        assert!(result.is_err());

        assert!(has_table(&pool, "categories").await.unwrap());
        assert!(!has_table(&pool, "categories_v2").await.unwrap());
        let enforced: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enforced, 1);
    }
}
