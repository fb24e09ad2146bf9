//! Configuration types.
//!
//! Everything is read from environment variables once at startup and then
//! injected into the components that need it.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Remote admin API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Login identity used by `authenticate()`.
    pub email: String,
    pub password: SecretString,
    pub retry: RetryConfig,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, email: impl Into<String>, password: SecretString) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.into(),
            password,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry budget for outbound API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Linear backoff step: the wait after attempt `n` is `n * backoff_step`.
    pub backoff_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(100),
        }
    }
}

/// Per-user cooldown for one-to-one conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum spacing between accepted interactions of one user.
    pub window: Duration,
    /// Forced pause applied to an interaction that violates the window.
    pub penalty: Duration,
    /// Maximum number of users tracked at once.
    pub capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(500),
            penalty: Duration::from_secs(4),
            capacity: 10_000,
        }
    }
}

/// Form session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are evicted.
    pub idle_ttl: Duration,
    /// How often the background sweep runs.
    pub sweep_interval: Duration,
    /// Conversation workers exit after this much inactivity.
    pub worker_idle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60), // 30 minutes
            sweep_interval: Duration::from_secs(60),
            worker_idle: Duration::from_secs(5 * 60),
        }
    }
}

/// Optional link buttons shown by the welcome, help and success messages.
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    pub platform_url: Option<String>,
    pub group_url: Option<String>,
    pub support_url: Option<String>,
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub api: ApiConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub links: LinkConfig,
    /// Telegram bot token; the CLI channel is used when absent.
    pub telegram_token: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required("API_BASE_URL")?;
        let email = required("API_EMAIL")?;
        let password = SecretString::from(required("API_PASSWORD")?);

        let retry = RetryConfig {
            max_attempts: parsed("API_MAX_ATTEMPTS")?.unwrap_or(3),
            backoff_step: Duration::from_millis(parsed("API_BACKOFF_MS")?.unwrap_or(100)),
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "API_MAX_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }

        let rate_limit = RateLimitConfig {
            window: Duration::from_millis(parsed("RATE_LIMIT_WINDOW_MS")?.unwrap_or(500)),
            penalty: Duration::from_millis(parsed("RATE_LIMIT_PENALTY_MS")?.unwrap_or(4000)),
            capacity: parsed("RATE_LIMIT_CAPACITY")?.unwrap_or(10_000),
        };

        let session = SessionConfig {
            idle_ttl: Duration::from_secs(parsed("SESSION_IDLE_TTL_SECS")?.unwrap_or(1800)),
            ..SessionConfig::default()
        };

        let links = LinkConfig {
            platform_url: optional("PLATFORM_URL"),
            group_url: optional("GROUP_URL"),
            support_url: optional("SUPPORT_URL"),
        };

        Ok(Self {
            api: ApiConfig::new(base_url, email, password).with_retry(retry),
            rate_limit,
            session,
            links,
            telegram_token: optional("TELEGRAM_BOT_TOKEN"),
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional(key)
        .map(|raw| {
            raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}
