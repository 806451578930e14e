// Savings, alert and password settings page

use axum::{
    extract::{Form, State},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::flash::Flash;
use super::{error_page, redirect_with, redirect_with_error, render_page};
use super::{PageContext, SettingsTemplate};
use crate::api::auth::{hash_token, CurrentUser, SESSION_COOKIE};
use crate::api::error::{LedgerError, ValidationErrorBuilder};
use crate::api::settings::update_settings;
use crate::api::validation::parse_decimal_field;
use crate::db::{SavingsUpdate, UserSettings};
use crate::{AppState, CookieJar};

pub async fn settings_page(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
) -> Response {
    let settings = match UserSettings::get_or_create(&state.db, user.id).await {
        Ok(settings) => settings,
        Err(e) => return error_page(e.into()),
    };

    render_page(jar, |flash| SettingsTemplate {
        page: PageContext::for_user(&user.username, flash),
        default_saving: settings.default_saving.normalize().to_string(),
        saving_percent: settings.saving_percent.normalize().to_string(),
        income_min_alert: settings.income_min_alert.normalize().to_string(),
    })
}

/// Absent fields count as zero; present ones must be numeric
#[derive(Deserialize)]
pub struct SettingsForm {
    start_saving: Option<String>,
    saving_percent: Option<String>,
    low_balance_alert: Option<String>,
    new_password: Option<String>,
}

fn parse_settings_form(form: &SettingsForm) -> Result<SavingsUpdate, LedgerError> {
    let mut errors = ValidationErrorBuilder::new();
    let mut field = |label: &str, raw: &Option<String>| match parse_decimal_field(label, raw.as_deref()) {
        Ok(value) => value,
        Err(message) => {
            errors.add(message);
            Default::default()
        }
    };

    let update = SavingsUpdate {
        default_saving: field("Fixed saving", &form.start_saving),
        saving_percent: field("Saving percent", &form.saving_percent),
        income_min_alert: field("Low balance alert", &form.low_balance_alert),
    };
    errors.finish()?;
    Ok(update)
}

pub async fn settings_submit(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
    Form(form): Form<SettingsForm>,
) -> Response {
    let update = match parse_settings_form(&form) {
        Ok(update) => update,
        Err(e) => return redirect_with_error(jar, e, "/settings"),
    };

    let current_session = jar.get(SESSION_COOKIE).map(|cookie| hash_token(cookie.value()));

    match update_settings(
        &state.db,
        user.id,
        &update,
        form.new_password.as_deref(),
        current_session.as_deref(),
    )
    .await
    {
        Ok(()) => redirect_with(jar, Flash::success("Settings saved."), "/settings"),
        Err(e) => redirect_with_error(jar, e, "/settings"),
    }
}
