//! Credential store and session gate.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use lazy_static::lazy_static;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::num::NonZeroU32;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::{LedgerError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_password, validate_security_answer, validate_username,
};
use crate::db::{NewUser, Session, User};
use crate::AppState;

pub const SESSION_COOKIE: &str = "tallybook_session";

/// Iteration count werkzeug used when the method string omits it
const LEGACY_PBKDF2_DEFAULT_ITERATIONS: u32 = 260_000;
const LEGACY_SCRYPT_N: u64 = 32768;
const LEGACY_SCRYPT_R: u32 = 8;
const LEGACY_SCRYPT_P: u32 = 1;

lazy_static! {
    /// Verified against when the account does not exist, so unknown users
    /// cost the same as wrong passwords
    static ref DUMMY_HASH: String = hash_password("tallybook-dummy-password").unwrap_or_default();
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2 hash or a legacy
/// `pbkdf2:sha256:<iterations>$<salt>$<hex>` or `scrypt:<n>:<r>:<p>$<salt>$<hex>` hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.starts_with("pbkdf2:") {
        return verify_legacy_pbkdf2(password, hash);
    }
    if hash.starts_with("scrypt:") {
        return verify_legacy_scrypt(password, hash);
    }

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Whether a stored hash should be replaced with a fresh Argon2 one
pub fn needs_rehash(hash: &str) -> bool {
    !hash.starts_with("$argon2")
}

fn verify_legacy_pbkdf2(password: &str, hash: &str) -> bool {
    let mut parts = hash.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let mut method_parts = method.split(':');
    if method_parts.next() != Some("pbkdf2") || method_parts.next() != Some("sha256") {
        return false;
    }
    let iterations = match method_parts.next() {
        Some(raw) => match raw.parse::<u32>().ok().and_then(NonZeroU32::new) {
            Some(n) => n,
            None => return false,
        },
        None => match NonZeroU32::new(LEGACY_PBKDF2_DEFAULT_ITERATIONS) {
            Some(n) => n,
            None => return false,
        },
    };

    let expected = match hex::decode(expected_hex) {
        Ok(bytes) if !bytes.is_empty() && bytes.len() <= 64 => bytes,
        _ => return false,
    };

    let mut derived = vec![0u8; expected.len()];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt.as_bytes(),
        password.as_bytes(),
        &mut derived,
    );

    derived.as_slice().ct_eq(expected.as_slice()).into()
}

fn verify_legacy_scrypt(password: &str, hash: &str) -> bool {
    let mut parts = hash.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let mut method_parts = method.split(':');
    if method_parts.next() != Some("scrypt") {
        return false;
    }
    let cost = method_parts.next().map_or(Some(LEGACY_SCRYPT_N), |raw| raw.parse::<u64>().ok());
    let block_size = method_parts.next().map_or(Some(LEGACY_SCRYPT_R), |raw| raw.parse::<u32>().ok());
    let parallelism = method_parts.next().map_or(Some(LEGACY_SCRYPT_P), |raw| raw.parse::<u32>().ok());
    let (Some(cost), Some(block_size), Some(parallelism)) = (cost, block_size, parallelism) else {
        return false;
    };
    // N must be a power of two above one
    if cost < 2 || !cost.is_power_of_two() {
        return false;
    }
    let log_n = cost.trailing_zeros() as u8;

    let expected = match hex::decode(expected_hex) {
        Ok(bytes) if !bytes.is_empty() && bytes.len() <= 64 => bytes,
        _ => return false,
    };

    let params = match scrypt::Params::new(log_n, block_size, parallelism, expected.len()) {
        Ok(params) => params,
        Err(_) => return false,
    };
    let mut derived = vec![0u8; expected.len()];
    if scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut derived).is_err() {
        return false;
    }

    derived.as_slice().ct_eq(expected.as_slice()).into()
}

fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Hash a security answer. Answers compare case-insensitively and ignore
/// surrounding whitespace.
pub fn hash_security_answer(answer: &str) -> Result<String, argon2::password_hash::Error> {
    hash_password(&normalize_answer(answer))
}

pub fn verify_security_answer(answer: &str, hash: &str) -> bool {
    if hash.is_empty() {
        return false;
    }
    verify_password(&normalize_answer(answer), hash)
}

/// Generate a random session token
pub(crate) fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn password_hash_error(err: argon2::password_hash::Error) -> LedgerError {
    tracing::error!("Failed to hash secret: {}", err);
    LedgerError::PasswordHash(err.to_string())
}

/// Fields submitted on the registration form
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub security_question: &'a str,
    pub security_answer: &'a str,
}

/// Create an account and return its id
pub async fn register(db: &SqlitePool, form: &Registration<'_>) -> Result<i64, LedgerError> {
    let username = form.username.trim();
    let email = form.email.trim();

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check(validate_username(username))
        .check(validate_email(email))
        .check(validate_password(form.password))
        .check(validate_security_answer(form.security_answer));
    errors.finish()?;

    if User::email_exists(db, email).await? {
        return Err(LedgerError::DuplicateEmail);
    }

    let password_hash = hash_password(form.password).map_err(password_hash_error)?;
    let answer_hash = hash_security_answer(form.security_answer).map_err(password_hash_error)?;

    // A concurrent registration can still hit the UNIQUE constraint; the
    // From<sqlx::Error> conversion turns that into DuplicateEmail too
    let user_id = User::create(
        db,
        &NewUser {
            username,
            email,
            password_hash: &password_hash,
            security_question: form.security_question.trim(),
            security_answer_hash: &answer_hash,
        },
    )
    .await?;

    tracing::info!(user_id, "Registered new user");
    Ok(user_id)
}

/// Check credentials. `identifier` may be a username or an email. Unknown
/// users and wrong passwords both yield `AuthFailure`.
pub async fn authenticate(
    db: &SqlitePool,
    identifier: &str,
    password: &str,
) -> Result<User, LedgerError> {
    let user = User::find_by_login(db, identifier.trim()).await?;

    let user = match user {
        Some(user) if verify_password(password, &user.password) => user,
        Some(user) => {
            tracing::warn!(user_id = user.id, "Login failed: wrong password");
            return Err(LedgerError::AuthFailure);
        }
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            tracing::warn!("Login failed: unknown account");
            return Err(LedgerError::AuthFailure);
        }
    };

    if needs_rehash(&user.password) {
        match hash_password(password) {
            Ok(new_hash) => {
                if let Err(e) = User::update_password(db, user.id, &new_hash).await {
                    tracing::warn!(user_id = user.id, "Failed to upgrade password hash: {}", e);
                } else {
                    tracing::info!(user_id = user.id, "Upgraded legacy password hash");
                }
            }
            Err(e) => tracing::warn!(user_id = user.id, "Failed to upgrade password hash: {}", e),
        }
    }

    Ok(user)
}

/// Replace the password of the account behind `email` if the security answer
/// matches. Every session of that account is ended.
pub async fn reset_password(
    db: &SqlitePool,
    email: &str,
    security_answer: &str,
    new_password: &str,
) -> Result<(), LedgerError> {
    validate_password(new_password).map_err(LedgerError::Validation)?;

    let user = User::find_by_email(db, email.trim()).await?;
    let user = match user {
        Some(user) if verify_security_answer(security_answer, &user.security_answer) => user,
        Some(user) => {
            tracing::warn!(user_id = user.id, "Password reset failed: wrong security answer");
            return Err(LedgerError::AuthFailure);
        }
        None => {
            let _ = verify_password(security_answer, &DUMMY_HASH);
            tracing::warn!("Password reset failed: unknown email");
            return Err(LedgerError::AuthFailure);
        }
    };

    let password_hash = hash_password(new_password).map_err(password_hash_error)?;
    User::update_password(db, user.id, &password_hash).await?;
    let ended = Session::delete_for_user(db, user.id).await?;

    tracing::info!(user_id = user.id, sessions_ended = ended, "Password reset");
    Ok(())
}

/// Create a session for `user_id` and return the raw token for the cookie
pub async fn start_session(state: &AppState, user_id: i64) -> Result<String, LedgerError> {
    let token = generate_token();
    let expires_at = chrono::Utc::now().timestamp() + state.config.auth.session_ttl_hours * 3600;

    Session::create(&state.db, user_id, &hash_token(&token), expires_at).await?;
    Ok(token)
}

pub async fn end_session(db: &SqlitePool, token: &str) -> Result<(), LedgerError> {
    Session::delete_by_token_hash(db, &hash_token(token)).await?;
    Ok(())
}

/// Cookie carrying a session token
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Cookie that clears the session cookie when removed from the jar
pub fn session_cookie_removal() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// The user behind a valid session cookie
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

pub async fn current_user<K>(
    state: &AppState,
    jar: &SignedCookieJar<K>,
) -> Result<Option<CurrentUser>, LedgerError> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };

    let now = chrono::Utc::now().timestamp();
    let found = Session::find_user(&state.db, &hash_token(cookie.value()), now).await?;
    Ok(found.map(|s| CurrentUser {
        id: s.user_id,
        username: s.username,
    }))
}

/// Extractor for the authenticated user. Anonymous requests are sent to the
/// login page.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, state.cookie_key.key().clone());

        match current_user(state, &jar).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(Redirect::to("/login")),
            Err(e) => {
                tracing::error!("Session lookup failed: {}", e);
                Err(Redirect::to("/login"))
            }
        }
    }
}
