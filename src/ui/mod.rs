// Server-rendered pages
// Askama templates; every form posts back and ends in a redirect plus flash

mod auth;
pub mod flash;
mod ledger;
mod settings;
mod templates;

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::error::LedgerError;
use crate::{AppState, CookieJar};
use flash::{set_flash, take_flash, Flash};

pub use templates::*;

// Render a page, consuming the pending flash message into it
fn render_page<T, F>(jar: CookieJar, build: F) -> Response
where
    T: Template,
    F: FnOnce(Option<Flash>) -> T,
{
    let (jar, flash) = take_flash(jar);
    match build(flash).render() {
        Ok(html) => (jar, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Template error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

fn redirect_with(jar: CookieJar, flash: Flash, to: &str) -> Response {
    (set_flash(jar, flash), Redirect::to(to)).into_response()
}

// Turn a failed operation into a flash message on the page at `to`
fn redirect_with_error(jar: CookieJar, err: LedgerError, to: &str) -> Response {
    if err.is_internal() {
        tracing::error!("Request failed: {}", err);
    }
    redirect_with(jar, Flash::error(err.user_message()), to)
}

// Plain error response for pages that have nowhere sensible to redirect to
fn error_page(err: LedgerError) -> Response {
    tracing::error!("Request failed: {}", err);
    (err.status_code(), err.user_message()).into_response()
}

/// Login, registration and reset forms. Rate limited by the caller.
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/register", get(auth::register_page).post(auth::register_submit))
        .route(
            "/forgot_password",
            get(auth::forgot_password_page).post(auth::forgot_password_submit),
        )
}

/// Pages behind the session gate, plus the landing redirect and logout
pub fn ledger_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .route("/logout", post(auth::logout))
        .route("/dashboard", get(ledger::dashboard))
        .route("/add", get(ledger::add_page).post(ledger::add_submit))
        .route("/history", get(ledger::history))
        .route("/delete_transaction/:id", get(ledger::delete_transaction))
        .route("/year_summary", get(ledger::year_summary))
        .route(
            "/categories",
            get(ledger::categories_page).post(ledger::categories_create),
        )
        .route("/categories/:id/delete", post(ledger::categories_delete))
        .route("/settings", get(settings::settings_page).post(settings::settings_submit))
}
