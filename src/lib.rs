pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod ui;

pub use db::DbPool;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::engine::LedgerClock;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub cookie_key: CookieKey,
    pub clock: LedgerClock,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Result<Self> {
        config.validate()?;

        let secret = config
            .auth
            .session_secret
            .as_deref()
            .context("auth.session_secret is not set")?;
        let cookie_key = CookieKey(Key::derive_from(secret.as_bytes()));
        let clock = LedgerClock::new(config.ledger.offset()?);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Ok(Self {
            config,
            db,
            cookie_key,
            clock,
            rate_limiter,
        })
    }
}

/// Signing key for the session and flash cookies
#[derive(Clone)]
pub struct CookieKey(Key);

impl CookieKey {
    pub fn key(&self) -> &Key {
        &self.0
    }
}

impl From<CookieKey> for Key {
    fn from(key: CookieKey) -> Self {
        key.0
    }
}

impl FromRef<Arc<AppState>> for CookieKey {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.cookie_key.clone()
    }
}

/// Cookie jar extracted by the page handlers
pub type CookieJar = SignedCookieJar<CookieKey>;

#[cfg(test)]
pub(crate) async fn test_state() -> Arc<AppState> {
    let mut config = Config::default();
    config.auth.session_secret = Some("x".repeat(64));
    let db = db::test_pool().await;
    Arc::new(AppState::new(config, db).expect("test state"))
}
