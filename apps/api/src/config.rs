use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Only malformed values fail startup; a missing `ANALYZE_URL` is allowed and
/// surfaces as `NotConfigured` on every analysis attempt.
#[derive(Debug, Clone)]
pub struct Config {
    pub analyze_url: Option<String>,
    pub redis_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub analyze_timeout_ms: u64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_ms: u64,
    pub ledger_timeout_ms: u64,
    pub max_input_chars: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            analyze_url: optional_env("ANALYZE_URL"),
            redis_url: optional_env("REDIS_URL"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            analyze_timeout_ms: parse_env("ANALYZE_TIMEOUT_MS", 30_000)?,
            rate_limit_max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10)?,
            rate_limit_window_ms: parse_env("RATE_LIMIT_WINDOW_MS", 60_000)?,
            ledger_timeout_ms: parse_env("LEDGER_TIMEOUT_MS", 2_000)?,
            max_input_chars: parse_env("MAX_INPUT_CHARS", 20_000)?,
        })
    }
}

/// Returns the variable's value, treating unset and blank the same way.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}
