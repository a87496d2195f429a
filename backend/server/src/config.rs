use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_TABLE: &str = "contact_submissions";
pub const DEFAULT_BOT_API_BASE: &str = "https://api.telegram.org";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub store: StoreConfig,
    pub notifier: Option<NotifierConfig>,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_submissions: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max_submissions: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Rest {
        url: String,
        key: String,
        table: String,
    },
    Redis {
        url: String,
        prefix: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

// keep the token out of logs
impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the process environment, falling back to `/run/secrets/<KEY>` for each key.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok().or_else(|| read_secret(key)))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(try_load(&var, "RATE_LIMIT_WINDOW_SECS", 3600)?),
            max_submissions: try_load(&var, "RATE_LIMIT_MAX", 5)?,
        };

        if rate_limit.max_submissions == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_MAX",
                reason: "must be at least 1".to_string(),
            });
        }

        let store = match var("STORE_BACKEND").as_deref().unwrap_or("rest") {
            "rest" => StoreConfig::Rest {
                url: required(&var, "STORE_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                key: required(&var, "STORE_KEY")?,
                table: var("STORE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            },
            "redis" => StoreConfig::Redis {
                url: required(&var, "REDIS_URL")?,
                prefix: var("REDIS_PREFIX").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    reason: format!("unknown backend {other}, expected rest or redis"),
                });
            }
        };

        let notifier = match (var("BOT_TOKEN"), var("CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(NotifierConfig {
                api_base: var("BOT_API_BASE")
                    .unwrap_or_else(|| DEFAULT_BOT_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                bot_token,
                chat_id,
            }),
            _ => {
                info!("BOT_TOKEN or CHAT_ID not set, notifications suppressed");
                None
            }
        };

        Ok(Self {
            port: try_load(&var, "RUST_PORT", 1111)?,
            rate_limit,
            store,
            notifier,
            http_timeout: Duration::from_secs(try_load(&var, "HTTP_TIMEOUT_SECS", 10)?),
        })
    }
}

fn required<F>(var: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    var(key).ok_or(ConfigError::Missing(key))
}

fn try_load<F, T>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return Ok(default);
    };

    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }
    })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path).map(|s| s.trim().to_string()).ok()
}
