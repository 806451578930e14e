//! Ledger transactions.
//!
//! Amounts are stored as decimal strings and timestamps as RFC 3339 strings
//! carrying the offset they were recorded in. Rows written by older versions
//! may hold REAL amounts and naive `YYYY-MM-DD HH:MM:SS[.ffffff]` timestamps;
//! both are read back transparently.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use super::category::CategoryKind;

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub amount: Decimal,
    pub note: String,
    pub timestamp: DateTime<FixedOffset>,
}

/// Raw row as stored
#[derive(Debug, FromRow)]
struct TransactionRow {
    id: i64,
    user_id: i64,
    category_id: i64,
    amount: String,
    note: String,
    date: String,
}

/// One transaction reduced to what the aggregation engine needs
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerLine {
    pub amount: Decimal,
    pub kind: CategoryKind,
    pub is_salary: bool,
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, FromRow)]
struct LedgerLineRow {
    amount: String,
    date: String,
    kind: CategoryKind,
    is_salary: bool,
}

/// A transaction annotated with its category, for the history view
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub amount: Decimal,
    pub note: String,
    pub timestamp: DateTime<FixedOffset>,
    pub category: String,
    pub kind: CategoryKind,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: i64,
    amount: String,
    note: String,
    date: String,
    category: String,
    kind: CategoryKind,
}

fn decode_error(what: &str, raw: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("invalid {} in transactions table: {:?}", what, raw).into())
}

/// Parse a stored amount
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse a stored timestamp. Naive values are taken to be in `fallback`.
pub fn parse_timestamp(raw: &str, fallback: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| fallback.from_local_datetime(&naive).single())
}

fn decode_amount(raw: &str) -> Result<Decimal, sqlx::Error> {
    parse_amount(raw).ok_or_else(|| decode_error("amount", raw))
}

fn decode_timestamp(raw: &str, fallback: FixedOffset) -> Result<DateTime<FixedOffset>, sqlx::Error> {
    parse_timestamp(raw, fallback).ok_or_else(|| decode_error("date", raw))
}

impl TransactionRow {
    fn into_transaction(self, fallback: FixedOffset) -> Result<Transaction, sqlx::Error> {
        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            category_id: self.category_id,
            amount: decode_amount(&self.amount)?,
            note: self.note,
            timestamp: decode_timestamp(&self.date, fallback)?,
        })
    }
}

impl Transaction {
    /// Append a transaction. The caller has already checked that the
    /// category belongs to `user_id`.
    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        category_id: i64,
        amount: Decimal,
        note: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (user_id, category_id, amount, note, date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(amount.to_string())
        .bind(note)
        .bind(timestamp.to_rfc3339())
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(
        db: &SqlitePool,
        id: i64,
        fallback: FixedOffset,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, category_id,
                   CAST(amount AS TEXT) AS amount,
                   COALESCE(note, '') AS note,
                   CAST(date AS TEXT) AS date
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;

        row.map(|r| r.into_transaction(fallback)).transpose()
    }

    /// Delete a transaction only if `user_id` owns it
    pub async fn delete_owned(db: &SqlitePool, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every transaction of a user joined with its category classification
    pub async fn ledger_lines(
        db: &SqlitePool,
        user_id: i64,
        fallback: FixedOffset,
    ) -> Result<Vec<LedgerLine>, sqlx::Error> {
        let rows: Vec<LedgerLineRow> = sqlx::query_as(
            r#"
            SELECT CAST(t.amount AS TEXT) AS amount,
                   CAST(t.date AS TEXT) AS date,
                   c.type AS kind,
                   c.is_salary AS is_salary
            FROM transactions t
            JOIN categories c ON t.category_id = c.id AND c.user_id = t.user_id
            WHERE t.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<LedgerLine, sqlx::Error> {
                Ok(LedgerLine {
                    amount: decode_amount(&row.amount)?,
                    kind: row.kind,
                    is_salary: row.is_salary,
                    timestamp: decode_timestamp(&row.date, fallback)?,
                })
            })
            .collect()
    }

    /// The user's transactions, newest first
    pub async fn history(
        db: &SqlitePool,
        user_id: i64,
        fallback: FixedOffset,
    ) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT t.id,
                   CAST(t.amount AS TEXT) AS amount,
                   COALESCE(t.note, '') AS note,
                   CAST(t.date AS TEXT) AS date,
                   c.name AS category,
                   c.type AS kind
            FROM transactions t
            JOIN categories c ON t.category_id = c.id AND c.user_id = t.user_id
            WHERE t.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(|row| -> Result<HistoryEntry, sqlx::Error> {
                Ok(HistoryEntry {
                    id: row.id,
                    amount: decode_amount(&row.amount)?,
                    note: row.note,
                    timestamp: decode_timestamp(&row.date, fallback)?,
                    category: row.category,
                    kind: row.kind,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        // Offsets may differ between rows, so order by instant rather than text
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(entries)
    }
}
