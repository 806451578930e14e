use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Minimum length of the session secret in bytes
pub const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign session and flash cookies. There is no default:
    /// it must come from the config file, `--session-secret` or
    /// `TALLYBOOK_SESSION_SECRET`.
    #[serde(default)]
    pub session_secret: Option<String>,
    /// Session lifetime in hours (default: 7 days)
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Mark cookies `Secure` (enable when served over HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_hours: default_session_ttl_hours(),
            secure_cookies: false,
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Offset from UTC applied to new transaction timestamps
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Symbol shown next to amounts in the UI
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
            currency_symbol: default_currency_symbol(),
        }
    }
}

fn default_utc_offset_hours() -> i32 {
    7
}

fn default_currency_symbol() -> String {
    "฿".to_string()
}

impl LedgerConfig {
    /// The configured offset as a chrono `FixedOffset`
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .with_context(|| format!("Invalid utc_offset_hours: {}", self.utc_offset_hours))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests allowed per window on login, registration and password reset
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Requests allowed per window on everything else
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of stale limiter entries and expired sessions
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            auth_requests_per_window: default_auth_requests(),
            api_requests_per_window: default_api_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_auth_requests() -> u32 {
    20
}

fn default_api_requests() -> u32 {
    300
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            ledger: LedgerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Check settings that have no usable default.
    pub fn validate(&self) -> Result<()> {
        match self.auth.session_secret.as_deref() {
            None | Some("") => bail!(
                "auth.session_secret is not set (use the config file, --session-secret or TALLYBOOK_SESSION_SECRET)"
            ),
            Some(secret) if secret.len() < MIN_SESSION_SECRET_LEN => bail!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_LEN
            ),
            Some(_) => {}
        }

        if !(-23..=23).contains(&self.ledger.utc_offset_hours) {
            bail!(
                "ledger.utc_offset_hours must be between -23 and 23, got {}",
                self.ledger.utc_offset_hours
            );
        }

        if self.auth.session_ttl_hours <= 0 {
            bail!("auth.session_ttl_hours must be positive");
        }

        Ok(())
    }
}
