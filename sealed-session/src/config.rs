//! Session configuration.

use crate::cookie::CookieOptions;
use crate::error::{SessionError, SessionResult};
use std::time::Duration;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Prefix prepended to `<name>:<id>` for remote keys
    pub key_prefix: String,
    /// Default session TTL
    pub default_ttl: Duration,
    /// Maximum session TTL (for security)
    pub max_ttl: Duration,
    /// Cookie attribute policy
    pub cookie: CookieOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_prefix: "session:".to_string(),
            default_ttl: Duration::from_secs(86400 * 30), // 30 days
            max_ttl: Duration::from_secs(86400 * 30),
            cookie: CookieOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `SESSION_KEY_PREFIX`, `SESSION_TTL_SECS`, `SESSION_MAX_TTL_SECS`,
    /// `SESSION_COOKIE_DOMAIN` and `SESSION_COOKIE_SECURE`; unset or
    /// unparsable variables keep their defaults.
    pub fn from_env() -> SessionResult<Self> {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("SESSION_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        if let Ok(ttl) = std::env::var("SESSION_TTL_SECS")
            && let Ok(secs) = ttl.parse() {
                config.default_ttl = Duration::from_secs(secs);
            }

        if let Ok(ttl) = std::env::var("SESSION_MAX_TTL_SECS")
            && let Ok(secs) = ttl.parse() {
                config.max_ttl = Duration::from_secs(secs);
            }

        if let Ok(domain) = std::env::var("SESSION_COOKIE_DOMAIN") {
            config.cookie.domain = Some(domain);
        }

        if let Ok(secure) = std::env::var("SESSION_COOKIE_SECURE") {
            config.cookie.secure = !(secure == "0" || secure.eq_ignore_ascii_case("false"));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the remote key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the default session TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the maximum session TTL.
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Set the cookie attribute policy.
    pub fn with_cookie(mut self, cookie: CookieOptions) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.default_ttl.is_zero() || self.max_ttl.is_zero() {
            return Err(SessionError::Config("session TTLs must be non-zero".to_string()));
        }
        if self.default_ttl > self.max_ttl {
            return Err(SessionError::Config(
                "default TTL exceeds maximum TTL".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp a requested TTL to `max_ttl`, falling back to `default_ttl`.
    pub fn effective_ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl).min(self.max_ttl)
    }

    /// Build the remote key: `<prefix><name>:<id>`.
    pub fn session_key(&self, name: &str, session_id: &str) -> String {
        format!("{}{}:{}", self.key_prefix, name, session_id)
    }
}
