//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MINIAPP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MINIAPP_BOT_TOKEN` - Chat platform bot token, the shared secret init data is signed with
//! - `MINIAPP_SESSION_SECRET` - Session credential signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `MINIAPP_HOST` - Bind address (default: 127.0.0.1)
//! - `MINIAPP_PORT` - Listen port (default: 3000)
//! - `MINIAPP_SESSION_COOKIE` - Session cookie name (default: `miniapp_session`)
//! - `MINIAPP_STAFF_SESSION_TTL_SECS` - Staff credential lifetime (default: 28800)
//! - `MINIAPP_MEMBER_SESSION_TTL_SECS` - Merchant/end-user credential lifetime (default: 2592000)
//! - `MINIAPP_LOGIN_RATE_LIMIT` / `MINIAPP_LOGIN_RATE_WINDOW_SECS` - Logins per client address (default: 10 per 60s, window at most 3600s)
//! - `MINIAPP_API_RATE_LIMIT` / `MINIAPP_API_RATE_WINDOW_SECS` - Gated requests per account (default: 120 per 60s, window at most 3600s)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use miniapp_core::SessionTtl;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Longest accepted rate-limit window. Idle counters are evicted after this
/// long, so a longer window could restart early.
pub const MAX_RATE_WINDOW_SECS: u64 = 60 * 60;

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "miniapp_session";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Chat platform bot token
    pub bot_token: SecretString,
    /// Session credential signing secret
    pub session_secret: SecretString,
    /// Session cookie and lifetime settings
    pub session: SessionConfig,
    /// Rate limits
    pub rate_limits: RateLimitConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("database_url", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bot_token", &"[REDACTED]")
            .field("session_secret", &"[REDACTED]")
            .field("session", &self.session)
            .field("rate_limits", &self.rate_limits)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[SET]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

/// Session cookie and credential lifetime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub staff_ttl_secs: i64,
    pub member_ttl_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_owned(),
            staff_ttl_secs: miniapp_core::session::DEFAULT_STAFF_TTL_SECS,
            member_ttl_secs: miniapp_core::session::DEFAULT_MEMBER_TTL_SECS,
        }
    }
}

impl SessionConfig {
    /// Credential lifetimes per tier.
    #[must_use]
    pub fn ttl(&self) -> SessionTtl {
        SessionTtl {
            staff: chrono::Duration::seconds(self.staff_ttl_secs),
            member: chrono::Duration::seconds(self.member_ttl_secs),
        }
    }

    /// Name of the companion cookie recording the policy the session cookie
    /// was last written with.
    #[must_use]
    pub fn marker_cookie_name(&self) -> String {
        format!("{}_policy", self.cookie_name)
    }
}

/// A fixed-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum hits per window
    pub limit: u64,
    /// Window length
    pub window: Duration,
}

/// Rate limits per endpoint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Login attempts, keyed by client address
    pub login: RateLimit,
    /// Gated API requests, keyed by account
    pub api: RateLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: RateLimit {
                limit: 10,
                window: Duration::from_secs(60),
            },
            api: RateLimit {
                limit: 120,
                window: Duration::from_secs(60),
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env
            .optional("MINIAPP_DATABASE_URL")
            // Fallback to generic DATABASE_URL (set by Fly.io postgres attach)
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("MINIAPP_DATABASE_URL".to_string()))?;
        let host = env.parsed_or("MINIAPP_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parsed_or("MINIAPP_PORT", 3000_u16)?;

        let bot_token = env.validated_secret("MINIAPP_BOT_TOKEN")?;
        validate_bot_token(&bot_token, "MINIAPP_BOT_TOKEN")?;
        let session_secret = env.validated_secret("MINIAPP_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "MINIAPP_SESSION_SECRET")?;

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            cookie_name: env
                .optional("MINIAPP_SESSION_COOKIE")
                .unwrap_or(defaults.cookie_name),
            staff_ttl_secs: env
                .positive_or("MINIAPP_STAFF_SESSION_TTL_SECS", defaults.staff_ttl_secs)?,
            member_ttl_secs: env
                .positive_or("MINIAPP_MEMBER_SESSION_TTL_SECS", defaults.member_ttl_secs)?,
        };
        validate_cookie_name(&session.cookie_name, "MINIAPP_SESSION_COOKIE")?;

        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            login: env.rate_limit("MINIAPP_LOGIN_RATE", defaults.login)?,
            api: env.rate_limit("MINIAPP_API_RATE", defaults.api)?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            bot_token,
            session_secret,
            session,
            rate_limits,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    fn positive_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        let value = self.parsed_or(key, default)?;
        if value <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(value)
    }

    fn rate_limit(&self, prefix: &str, default: RateLimit) -> Result<RateLimit, ConfigError> {
        let limit_key = format!("{prefix}_LIMIT");
        let window_key = format!("{prefix}_WINDOW_SECS");
        let limit = self.parsed_or(&limit_key, default.limit)?;
        let window_secs = self.parsed_or(&window_key, default.window.as_secs())?;
        if limit == 0 {
            return Err(ConfigError::InvalidEnvVar(
                limit_key,
                "must be greater than zero".to_string(),
            ));
        }
        if window_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                window_key,
                "must be greater than zero".to_string(),
            ));
        }
        if window_secs > MAX_RATE_WINDOW_SECS {
            return Err(ConfigError::InvalidEnvVar(
                window_key,
                format!("must be at most {MAX_RATE_WINDOW_SECS}"),
            ));
        }
        Ok(RateLimit {
            limit,
            window: Duration::from_secs(window_secs),
        })
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Validate the `<bot id>:<key>` shape of a bot token.
fn validate_bot_token(token: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let well_formed = token
        .expose_secret()
        .split_once(':')
        .is_some_and(|(id, key)| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !key.is_empty()
        });
    if !well_formed {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "expected '<bot id>:<key>'".to_string(),
        ));
    }
    Ok(())
}

/// Cookie names are RFC 6265 tokens.
fn validate_cookie_name(name: &str, var_name: &str) -> Result<(), ConfigError> {
    let valid = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !valid {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("'{name}' is not a valid cookie name"),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
