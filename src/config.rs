use std::str::FromStr;

use pdf_table_extract::DEFAULT_BATCH_SIZE;
use pdf_table_extract::render::DEFAULT_PREVIEW_DPI;
use serde::Serialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "PDF_TABLE_GENIUS_";
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 2 * 60 * 60;
pub const DEFAULT_MAX_SESSIONS: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub bind: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub preview_dpi: u32,
    pub batch_size: usize,
    pub reset_clears_history: bool,
    pub default_pages: String,
    pub session_ttl_seconds: i64,
    pub max_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            preview_dpi: DEFAULT_PREVIEW_DPI,
            batch_size: DEFAULT_BATCH_SIZE,
            reset_clears_history: true,
            default_pages: "1".to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| ConfigError {
        key: key.to_string(),
        value: raw.to_string(),
        reason: error.to_string(),
    })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

impl AppConfig {
    /// Applies `PDF_TABLE_GENIUS_*` overrides read through `lookup` on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };
        let mut config = Self::default();

        if let Some((_, value)) = var("BIND") {
            config.bind = value.trim().to_string();
        }
        if let Some((key, value)) = var("PORT") {
            config.port = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_UPLOAD_MB") {
            let megabytes: usize = parse_value(&key, &value)?;
            config.max_upload_bytes = megabytes.saturating_mul(1024 * 1024);
        }
        if let Some((key, value)) = var("PREVIEW_DPI") {
            config.preview_dpi = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("BATCH_SIZE") {
            config.batch_size = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("RESET_CLEARS_HISTORY") {
            config.reset_clears_history = parse_flag(&key, &value)?;
        }
        if let Some((_, value)) = var("DEFAULT_PAGES") {
            config.default_pages = value.trim().to_string();
        }
        if let Some((key, value)) = var("SESSION_TTL_SECONDS") {
            config.session_ttl_seconds = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_SESSIONS") {
            config.max_sessions = parse_value(&key, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String, reason: &str| ConfigError {
            key: key.to_string(),
            value,
            reason: reason.to_string(),
        };
        if self.max_upload_bytes == 0 {
            return Err(invalid("max_upload_bytes", "0".to_string(), "must be positive"));
        }
        if self.preview_dpi == 0 {
            return Err(invalid("preview_dpi", "0".to_string(), "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "0".to_string(), "must be positive"));
        }
        if self.default_pages.is_empty() {
            return Err(invalid("default_pages", String::new(), "must not be empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
