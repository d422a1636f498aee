use crate::{Error, Result};

/// Default location of the watchlist tunables file.
pub const DEFAULT_WATCHLIST_PATH: &str = "config/watchlist.toml";

/// Secrets and paths loaded from environment variables at startup.
/// Tunables (symbols, timeframe, indicator parameters) live in the watchlist file.
#[derive(Clone)]
pub struct Config {
    // Telegram
    pub telegram_token: String,
    /// Numeric chat id or `@channel` username alerts are sent to.
    pub telegram_chat_id: String,

    /// Watchlist TOML path. `None` means the default path, which may be absent.
    pub watchlist_config_path: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("watchlist_config_path", &self.watchlist_config_path)
            .finish()
    }
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Any missing required variable is an `Error::Config`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            telegram_token: required(&lookup, "TELEGRAM_TOKEN")?,
            telegram_chat_id: required(&lookup, "TELEGRAM_CHAT_ID")?,
            watchlist_config_path: optional(&lookup, "WATCHLIST_CONFIG_PATH"),
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
