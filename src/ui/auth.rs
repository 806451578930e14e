// Login, registration, password reset and logout pages

use axum::{
    extract::{Form, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::flash::Flash;
use super::{redirect_with, redirect_with_error, render_page};
use super::{ForgotPasswordTemplate, LoginTemplate, PageContext, RegisterTemplate};
use crate::api::auth::{
    authenticate, end_session, register, reset_password, session_cookie, session_cookie_removal,
    start_session, Registration, SESSION_COOKIE,
};
use crate::{AppState, CookieJar};

pub async fn login_page(jar: CookieJar) -> Response {
    render_page(jar, |flash| LoginTemplate {
        page: PageContext::anonymous(flash),
    })
}

#[derive(Deserialize)]
pub struct LoginForm {
    /// Username or email
    #[serde(default, alias = "email")]
    identifier: String,
    #[serde(default)]
    password: String,
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match authenticate(&state.db, &form.identifier, &form.password).await {
        Ok(user) => user,
        Err(e) => return redirect_with_error(jar, e, "/login"),
    };

    match start_session(&state, user.id).await {
        Ok(token) => {
            tracing::info!(user_id = user.id, "User logged in");
            let jar = jar.add(session_cookie(token, state.config.auth.secure_cookies));
            (jar, Redirect::to("/dashboard")).into_response()
        }
        Err(e) => redirect_with_error(jar, e, "/login"),
    }
}

pub async fn register_page(jar: CookieJar) -> Response {
    render_page(jar, |flash| RegisterTemplate {
        page: PageContext::anonymous(flash),
    })
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    security_question: String,
    #[serde(default)]
    security_answer: String,
}

pub async fn register_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    let registration = Registration {
        username: &form.username,
        email: &form.email,
        password: &form.password,
        security_question: &form.security_question,
        security_answer: &form.security_answer,
    };

    match register(&state.db, &registration).await {
        Ok(_) => redirect_with(jar, Flash::success("Registration successful. Please log in."), "/login"),
        Err(e) => redirect_with_error(jar, e, "/register"),
    }
}

pub async fn forgot_password_page(jar: CookieJar) -> Response {
    render_page(jar, |flash| ForgotPasswordTemplate {
        page: PageContext::anonymous(flash),
    })
}

#[derive(Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    new_password: String,
}

pub async fn forgot_password_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ForgotPasswordForm>,
) -> Response {
    match reset_password(&state.db, &form.email, &form.answer, &form.new_password).await {
        Ok(()) => redirect_with(jar, Flash::success("Password changed. Please log in."), "/login"),
        Err(e) => redirect_with_error(jar, e, "/forgot_password"),
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(e) = end_session(&state.db, cookie.value()).await {
            tracing::warn!("Failed to end session: {}", e);
        }
    }

    let jar = jar.remove(session_cookie_removal());
    redirect_with(jar, Flash::info("Logged out."), "/login")
}
