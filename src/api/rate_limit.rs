//! Per-client rate limiting.
//!
//! Fixed windows per (client IP, tier). Credential forms get a small budget
//! so answers and passwords cannot be guessed at speed; the JSON endpoint
//! gets a larger one.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::LedgerError;
use crate::config::RateLimitConfig;
use crate::db::Session;
use crate::ui::flash::{set_flash, Flash};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Login, registration and password reset submissions
    Auth,
    /// JSON endpoints
    Api,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    hits: u32,
    window_start: Instant,
}

/// Thread-safe rate limiter using dashmap
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<(IpAddr, RateLimitTier), WindowEntry>,
    config: RateLimitConfig,
    window: Duration,
}

/// Outcome of an allowed request
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Auth => self.config.auth_requests_per_window,
            RateLimitTier::Api => self.config.api_requests_per_window,
        }
    }

    /// Count a request. Returns Err(retry_after_seconds) once the window's
    /// budget is spent.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, u64> {
        let limit = self.limit_for(tier);
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                limit,
                remaining: limit,
                reset_after: 0,
            });
        }

        let now = Instant::now();
        let mut entry = self.entries.entry((ip, tier)).or_insert(WindowEntry {
            hits: 0,
            window_start: now,
        });

        let mut elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.hits = 0;
            entry.window_start = now;
            elapsed = Duration::ZERO;
        }
        let reset_after = self.window.saturating_sub(elapsed).as_secs().max(1);

        if entry.hits >= limit {
            return Err(reset_after);
        }
        entry.hits += 1;

        Ok(RateLimitInfo {
            limit,
            remaining: limit - entry.hits,
            reset_after,
        })
    }

    /// Drop windows that ended long enough ago to be irrelevant
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// The peer address, or the proxy-reported client when the peer is a local
/// reverse proxy
fn client_ip(request: &Request) -> IpAddr {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match peer {
        Some(ip) if !ip.is_loopback() => ip,
        _ => forwarded_ip(request.headers())
            .or(peer)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    }
}

/// Middleware for credential forms. Only submissions count; a limited
/// submission is bounced back to its form with a flash message.
pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    match state.rate_limiter.check(ip, RateLimitTier::Auth) {
        Ok(_) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(%ip, path = %request.uri().path(), "Auth rate limit exceeded");
            let jar = SignedCookieJar::from_headers(request.headers(), state.cookie_key.key().clone());
            let jar = set_flash(
                jar,
                Flash::error(format!(
                    "Too many attempts. Try again in {} seconds.",
                    retry_after
                )),
            );
            (jar, Redirect::to(request.uri().path())).into_response()
        }
    }
}

/// Middleware for JSON endpoints
pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    match state.rate_limiter.check(ip, RateLimitTier::Api) {
        Ok(info) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(info.reset_after));
            response
        }
        Err(retry_after) => {
            tracing::warn!(%ip, "API rate limit exceeded");
            let mut response = LedgerError::RateLimited.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

/// Periodically drop stale rate limit windows and expired sessions
pub fn spawn_cleanup_task(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.config.rate_limit.cleanup_interval.max(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            state.rate_limiter.cleanup_expired();
            match Session::purge_expired(&state.db, chrono::Utc::now().timestamp()).await {
                Ok(purged) => tracing::debug!(
                    purged,
                    rate_limit_entries = state.rate_limiter.entry_count(),
                    "Cleanup complete"
                ),
                Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
            }
        }
    });
}
