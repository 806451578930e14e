//! Per-user savings and alert settings.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor, SqlitePool};

use super::transaction::parse_amount;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSettings {
    pub user_id: i64,
    /// Fixed amount set aside regardless of income
    pub default_saving: Decimal,
    /// Share of salary set aside, in percent
    pub saving_percent: Decimal,
    /// Balance below which the dashboard warns
    pub income_min_alert: Decimal,
    pub income_max_alert: Decimal,
}

/// New values for the savings fields of a settings row
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsUpdate {
    pub default_saving: Decimal,
    pub saving_percent: Decimal,
    pub income_min_alert: Decimal,
}

#[derive(Debug, FromRow)]
struct SettingsRow {
    user_id: i64,
    default_saving: String,
    saving_percent: String,
    income_min_alert: String,
    income_max_alert: String,
}

fn decode(column: &str, raw: &str) -> Result<Decimal, sqlx::Error> {
    parse_amount(raw).ok_or_else(|| {
        sqlx::Error::Decode(format!("invalid {} in user_settings: {:?}", column, raw).into())
    })
}

impl TryFrom<SettingsRow> for UserSettings {
    type Error = sqlx::Error;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            default_saving: decode("default_saving", &row.default_saving)?,
            saving_percent: decode("saving_percent", &row.saving_percent)?,
            income_min_alert: decode("income_min_alert", &row.income_min_alert)?,
            income_max_alert: decode("income_max_alert", &row.income_max_alert)?,
        })
    }
}

impl UserSettings {
    /// All-zero settings, as created on first access
    pub fn zeroed(user_id: i64) -> Self {
        Self {
            user_id,
            default_saving: Decimal::ZERO,
            saving_percent: Decimal::ZERO,
            income_min_alert: Decimal::ZERO,
            income_max_alert: Decimal::ZERO,
        }
    }

    /// Ensure the row exists. A single upsert, so concurrent first accesses
    /// cannot race into a duplicate insert.
    pub async fn ensure<'e, E>(executor: E, user_id: i64) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, default_saving, saving_percent, income_min_alert, income_max_alert)
            VALUES (?, '0', '0', '0', '0')
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn get_or_create(db: &SqlitePool, user_id: i64) -> Result<UserSettings, sqlx::Error> {
        Self::ensure(db, user_id).await?;

        let row: SettingsRow = sqlx::query_as(
            r#"
            SELECT user_id,
                   CAST(COALESCE(default_saving, 0) AS TEXT) AS default_saving,
                   CAST(COALESCE(saving_percent, 0) AS TEXT) AS saving_percent,
                   CAST(COALESCE(income_min_alert, 0) AS TEXT) AS income_min_alert,
                   CAST(COALESCE(income_max_alert, 0) AS TEXT) AS income_max_alert
            FROM user_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        row.try_into()
    }

    /// Overwrite the savings fields, creating the row if needed
    pub async fn update_savings<'e, E>(
        executor: E,
        user_id: i64,
        update: &SavingsUpdate,
    ) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, default_saving, saving_percent, income_min_alert, income_max_alert)
            VALUES (?, ?, ?, ?, '0')
            ON CONFLICT(user_id) DO UPDATE SET
                default_saving = excluded.default_saving,
                saving_percent = excluded.saving_percent,
                income_min_alert = excluded.income_min_alert
            "#,
        )
        .bind(user_id)
        .bind(update.default_saving.to_string())
        .bind(update.saving_percent.to_string())
        .bind(update.income_min_alert.to_string())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Overwrite only the low-balance threshold
    pub async fn update_min_alert(
        db: &SqlitePool,
        user_id: i64,
        income_min_alert: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, default_saving, saving_percent, income_min_alert, income_max_alert)
            VALUES (?, '0', '0', ?, '0')
            ON CONFLICT(user_id) DO UPDATE SET income_min_alert = excluded.income_min_alert
            "#,
        )
        .bind(user_id)
        .bind(income_min_alert.to_string())
        .execute(db)
        .await?;
        Ok(())
    }
}
