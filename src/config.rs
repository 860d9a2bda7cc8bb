use std::str::FromStr;
use std::time::Duration;

use crate::api_client::{DEFAULT_COOKIE_URL, DEFAULT_QUOTE_API_BASE};
use crate::error::ConfigError;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub holdings_csv: Option<String>,
    pub quote_api_base: String,
    pub quote_cookie_url: String,
    pub port: u16,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    /// Reads configuration from the process environment (after `.env` has
    /// been loaded by the caller).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let refresh_secs: u64 =
            parse_var(&lookup, "REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?;
        let timeout_secs: u64 =
            parse_var(&lookup, "FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        if refresh_secs == 0 {
            return Err(ConfigError::Env {
                var: "REFRESH_INTERVAL_SECS",
                message: "must be greater than zero".to_string(),
            });
        }
        if timeout_secs == 0 {
            return Err(ConfigError::Env {
                var: "FETCH_TIMEOUT_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            refresh_interval: Duration::from_secs(refresh_secs),
            fetch_timeout: Duration::from_secs(timeout_secs),
            holdings_csv: non_empty(&lookup, "HOLDINGS_CSV"),
            quote_api_base: non_empty(&lookup, "QUOTE_API_BASE")
                .unwrap_or_else(|| DEFAULT_QUOTE_API_BASE.to_string()),
            quote_cookie_url: non_empty(&lookup, "QUOTE_COOKIE_URL")
                .unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string()),
            port: parse_var(&lookup, "PORT", DEFAULT_PORT)?,
            cors_origin: non_empty(&lookup, "CORS_ORIGIN"),
        })
    }
}

fn non_empty<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Env {
            var,
            message: format!("{:?}: {}", raw, e),
        }),
    }
}
