use std::time::Duration;

use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Strategy config file path
    pub strategy_config_path: String,

    // Telegram (disabled when no token is configured)
    pub telegram_token: Option<String>,
    pub telegram_allowed_user_ids: Vec<i64>,

    // Dispatch
    pub indicator_lookup_timeout: Duration,
    /// How long shutdown waits for queued signals to be delivered.
    pub shutdown_grace: Duration,

    /// Start the kline streams without waiting for a `/start` command.
    pub autostart: bool,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_token = var("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty());

        let telegram_allowed_user_ids = match var("TELEGRAM_ALLOWED_USER_IDS") {
            Some(raw) => parse_user_ids(&raw)?,
            None if telegram_token.is_some() => {
                return Err(Error::Config(
                    "TELEGRAM_ALLOWED_USER_IDS is required when TELEGRAM_TOKEN is set".into(),
                ))
            }
            None => Vec::new(),
        };

        let timeout_ms: u64 = parse_or(
            "INDICATOR_LOOKUP_TIMEOUT_MS",
            var("INDICATOR_LOOKUP_TIMEOUT_MS"),
            250,
        )?;
        let grace_ms: u64 = parse_or("SHUTDOWN_GRACE_MS", var("SHUTDOWN_GRACE_MS"), 5_000)?;

        let autostart = match var("AUTOSTART").map(|v| v.trim().to_lowercase()) {
            None => true,
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::Config(format!(
                        "AUTOSTART must be true or false, got: '{other}'"
                    )))
                }
            },
        };

        Ok(Config {
            strategy_config_path: var("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/techsignal.toml".to_string()),
            telegram_token,
            telegram_allowed_user_ids,
            indicator_lookup_timeout: Duration::from_millis(timeout_ms),
            shutdown_grace: Duration::from_millis(grace_ms),
            autostart,
        })
    }
}

fn parse_user_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                Error::Config(format!(
                    "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{s}'"
                ))
            })
        })
        .collect()
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} is not a valid number: '{v}'"))),
    }
}
