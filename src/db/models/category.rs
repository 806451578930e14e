//! Income/expense categories owned by a user.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Whether money in a category counts as income or expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "income" => Some(CategoryKind::Income),
            "expense" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: CategoryKind,
    /// Transactions in this category feed the percentage-based saving
    pub is_salary: bool,
}

impl Category {
    pub async fn list_for_user(db: &SqlitePool, user_id: i64) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, user_id, name, type, is_salary
            FROM categories
            WHERE user_id = ?
            ORDER BY type DESC, name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Fetch a category only if it belongs to `user_id`
    pub async fn get_for_user(
        db: &SqlitePool,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, user_id, name, type, is_salary
            FROM categories
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    pub async fn name_exists(db: &SqlitePool, user_id: i64, name: &str) -> Result<bool, sqlx::Error> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM categories WHERE user_id = ? AND name = ?")
                .bind(user_id)
                .bind(name)
                .fetch_optional(db)
                .await?;
        Ok(found.is_some())
    }

    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        name: &str,
        kind: CategoryKind,
        is_salary: bool,
    ) -> Result<Category, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO categories (user_id, name, type, is_salary)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(kind)
        .bind(is_salary)
        .execute(db)
        .await?;

        Self::get_for_user(db, user_id, result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn count_transactions(db: &SqlitePool, id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE category_id = ?")
            .bind(id)
            .fetch_one(db)
            .await
    }

    /// Delete a category owned by `user_id`. Fails with a foreign key error
    /// while transactions still reference it.
    pub async fn delete_for_user(db: &SqlitePool, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
