//! Settings mutations: the settings form and the JSON alert endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::auth::{hash_password, CurrentUser};
use super::error::{JsonStatus, LedgerError};
use super::validation::{parse_amount_input, validate_password};
use crate::db::{SavingsUpdate, Session, User, UserSettings};
use crate::AppState;

/// Overwrite the savings fields and, when given a non-empty one, the
/// password. A password change also ends every other session of the user,
/// keeping only the one hashed as `current_session`. All writes commit
/// together or not at all.
pub async fn update_settings(
    db: &SqlitePool,
    user_id: i64,
    update: &SavingsUpdate,
    new_password: Option<&str>,
    current_session: Option<&str>,
) -> Result<(), LedgerError> {
    let password_hash = match new_password.filter(|p| !p.is_empty()) {
        Some(password) => {
            validate_password(password).map_err(LedgerError::Validation)?;
            Some(hash_password(password).map_err(|e| LedgerError::PasswordHash(e.to_string()))?)
        }
        None => None,
    };

    let mut tx = db.begin().await?;
    UserSettings::update_savings(&mut *tx, user_id, update).await?;
    let mut sessions_ended = 0;
    if let Some(hash) = &password_hash {
        User::update_password(&mut *tx, user_id, hash).await?;
        sessions_ended = Session::delete_others_for_user(&mut *tx, user_id, current_session).await?;
    }
    tx.commit().await?;

    tracing::info!(
        user_id,
        password_changed = password_hash.is_some(),
        sessions_ended,
        "Settings updated"
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct SaveSettingsRequest {
    /// Number or numeric string; absent means zero
    #[serde(default)]
    pub min_balance: Option<serde_json::Value>,
}

fn parse_min_balance(value: Option<&serde_json::Value>) -> Result<Decimal, LedgerError> {
    let parsed = match value {
        None | Some(serde_json::Value::Null) => return Ok(Decimal::ZERO),
        Some(serde_json::Value::Number(n)) => parse_amount_input("min_balance", &n.to_string()),
        Some(serde_json::Value::String(s)) => parse_amount_input("min_balance", s),
        Some(_) => Err("min_balance must be a number.".to_string()),
    };
    parsed.map_err(LedgerError::Validation)
}

/// `POST /save_settings`: update the low-balance threshold
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    payload: Result<Json<SaveSettingsRequest>, JsonRejection>,
) -> Result<Json<JsonStatus>, LedgerError> {
    let user = user.ok_or(LedgerError::Unauthenticated)?;
    let Json(request) = payload.map_err(|e| LedgerError::validation(e.body_text()))?;

    let min_balance = parse_min_balance(request.min_balance.as_ref())?;
    UserSettings::update_min_alert(&state.db, user.id, min_balance).await?;

    tracing::info!(user_id = user.id, %min_balance, "Low balance alert updated");
    Ok(Json(JsonStatus::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{authenticate, register, Registration};
    use crate::db::test_pool;
    use serde_json::json;

    #[test]
    fn test_parse_min_balance() {
        assert_eq!(parse_min_balance(None).unwrap(), Decimal::ZERO);
        assert_eq!(parse_min_balance(Some(&json!(1500))).unwrap(), Decimal::from(1500));
        assert_eq!(parse_min_balance(Some(&json!("99.5"))).unwrap(), Decimal::new(995, 1));
        assert_eq!(parse_min_balance(Some(&json!(2.25))).unwrap(), Decimal::new(225, 2));
        assert!(parse_min_balance(Some(&json!("lots"))).is_err());
        assert!(parse_min_balance(Some(&json!([1]))).is_err());
        assert!(parse_min_balance(Some(&json!(1e27))).is_err());
        assert!(parse_min_balance(Some(&json!("1000000000000000000000000000"))).is_err());
    }

    #[tokio::test]
    async fn test_update_settings_with_password() {
        let db = test_pool().await;
        let uid = register(
            &db,
            &Registration {
                username: "alice",
                email: "alice@example.com",
                password: "password1",
                security_question: "",
                security_answer: "Rex",
            },
        )
        .await
        .unwrap();

        let update = SavingsUpdate {
            default_saving: Decimal::from(500),
            saving_percent: Decimal::from(10),
            income_min_alert: Decimal::from(100),
        };
        update_settings(&db, uid, &update, Some("newpassword"), None).await.unwrap();

        let settings = UserSettings::get_or_create(&db, uid).await.unwrap();
        assert_eq!(settings.default_saving, Decimal::from(500));
        assert!(authenticate(&db, "alice", "newpassword").await.is_ok());

        // Empty password keeps the current one
        update_settings(&db, uid, &update, Some(""), None).await.unwrap();
        assert!(authenticate(&db, "alice", "newpassword").await.is_ok());
    }

    #[tokio::test]
    async fn test_short_password_rejects_whole_update() {
        let db = test_pool().await;
        let uid = register(
            &db,
            &Registration {
                username: "alice",
                email: "alice@example.com",
                password: "password1",
                security_question: "",
                security_answer: "Rex",
            },
        )
        .await
        .unwrap();

        let update = SavingsUpdate {
            default_saving: Decimal::from(500),
            saving_percent: Decimal::ZERO,
            income_min_alert: Decimal::ZERO,
        };
        let result = update_settings(&db, uid, &update, Some("short"), None).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let settings = UserSettings::get_or_create(&db, uid).await.unwrap();
        assert_eq!(settings.default_saving, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_password_change_ends_other_sessions() {
        let db = test_pool().await;
        let uid = register(
            &db,
            &Registration {
                username: "alice",
                email: "alice@example.com",
                password: "password1",
                security_question: "",
                security_answer: "Rex",
            },
        )
        .await
        .unwrap();
        Session::create(&db, uid, "current", i64::MAX).await.unwrap();
        Session::create(&db, uid, "stolen", i64::MAX).await.unwrap();

        let update = SavingsUpdate {
            default_saving: Decimal::ZERO,
            saving_percent: Decimal::ZERO,
            income_min_alert: Decimal::ZERO,
        };

        // Savings-only updates leave sessions alone
        update_settings(&db, uid, &update, None, Some("current")).await.unwrap();
        assert!(Session::find_user(&db, "stolen", 0).await.unwrap().is_some());

        update_settings(&db, uid, &update, Some("newpassword"), Some("current"))
            .await
            .unwrap();
        assert!(Session::find_user(&db, "current", 0).await.unwrap().is_some());
        assert!(Session::find_user(&db, "stolen", 0).await.unwrap().is_none());
    }
}
