//! Process configuration read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use tenantgate_auth::{TokenConfig, TokenConfigError};

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,

    #[error(transparent)]
    Tokens(#[from] TokenConfigError),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub tokens: TokenConfig,
    /// Require a live session for every access token, not only at refresh.
    pub strict_session_check: bool,
    pub refresh_cookie_path: String,
    pub session_sweep_interval: StdDuration,
    /// JSON file of development accounts loaded at startup.
    pub dev_users_file: Option<PathBuf>,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            tokens: TokenConfig::default(),
            strict_session_check: false,
            refresh_cookie_path: "/auth".to_string(),
            session_sweep_interval: StdDuration::from_secs(300),
            dev_users_file: None,
            use_persistent_stores: false,
            database_url: None,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take defaults;
    /// set but unparsable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        let tokens = TokenConfig {
            issuer: lookup("TOKEN_ISSUER").unwrap_or(defaults.tokens.issuer),
            access_ttl: secs(&lookup, "ACCESS_TOKEN_TTL_SECS")?.unwrap_or(defaults.tokens.access_ttl),
            refresh_ttl: secs(&lookup, "REFRESH_TOKEN_TTL_SECS")?.unwrap_or(defaults.tokens.refresh_ttl),
            session_ttl: secs(&lookup, "SESSION_TTL_SECS")?.unwrap_or(defaults.tokens.session_ttl),
            embed_override_snapshot: flag(&lookup, "EMBED_OVERRIDE_SNAPSHOT")?
                .unwrap_or(defaults.tokens.embed_override_snapshot),
        };
        tokens.validate()?;

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "BIND_ADDR",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.bind_addr,
        };

        let session_sweep_interval = match number(&lookup, "SESSION_SWEEP_SECS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "SESSION_SWEEP_SECS",
                    value: "0".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            Some(n) => StdDuration::from_secs(n),
            None => defaults.session_sweep_interval,
        };

        let use_persistent_stores = flag(&lookup, "USE_PERSISTENT_STORES")?.unwrap_or(false);
        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            tokens,
            strict_session_check: flag(&lookup, "STRICT_SESSION_CHECK")?.unwrap_or(false),
            refresh_cookie_path: lookup("REFRESH_COOKIE_PATH").unwrap_or(defaults.refresh_cookie_path),
            session_sweep_interval,
            dev_users_file: lookup("DEV_USERS_FILE").map(PathBuf::from),
            use_persistent_stores,
            database_url,
        })
    }
}

fn number(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<u64>, ConfigError> {
    lookup(var)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(n) = number(lookup, var)? else {
        return Ok(None);
    };
    i64::try_from(n)
        .ok()
        .and_then(Duration::try_seconds)
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid {
            var,
            value: n.to_string(),
            reason: "out of range".to_string(),
        })
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<bool>, ConfigError> {
    lookup(var)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: "expected a boolean".to_string(),
            }),
        })
        .transpose()
}
