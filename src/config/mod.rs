//! Application configuration from environment variables.
//!
//! [`Config::from_env`] first loads a `.env` file from the working directory,
//! when there is one, then reads:
//!
//! | Variable                | Default          |
//! |-------------------------|------------------|
//! | `APP_NAME`              | `Captación`      |
//! | `APP_URL`               | *(empty)*        |
//! | `APP_BIND`              | `127.0.0.1:8000` |
//! | `APP_DEBUG`             | `false`          |
//! | `DB_PATH`               | `captacion.db`   |
//! | `SESSION_LIFETIME_SECS` | `7200`           |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Errors raised while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a whole number of seconds, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be true or false, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

/// Settings shared by every request.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Base URL that redirects are built against, without a trailing slash.
    pub app_url: String,
    pub bind: String,
    pub debug: bool,
    pub db_path: PathBuf,
    /// Idle time after which a session is discarded.
    pub session_lifetime: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Captación".to_owned(),
            app_url: String::new(),
            bind: "127.0.0.1:8000".to_owned(),
            debug: false,
            db_path: PathBuf::from("captacion.db"),
            session_lifetime: Duration::from_secs(7200),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment and `.env`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if `APP_DEBUG` or `SESSION_LIFETIME_SECS` is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenv::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) => debug!(error = %e, "no .env file loaded"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let debug = match var("APP_DEBUG") {
            Some(value) => parse_bool("APP_DEBUG", &value)?,
            None => defaults.debug,
        };

        let session_lifetime = match var("SESSION_LIFETIME_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidNumber {
                    key: "SESSION_LIFETIME_SECS",
                    value,
                })?,
            None => defaults.session_lifetime,
        };

        Ok(Self {
            app_name: var("APP_NAME").unwrap_or(defaults.app_name),
            app_url: var("APP_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.app_url),
            bind: var("APP_BIND").unwrap_or(defaults.bind),
            debug,
            db_path: var("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            session_lifetime,
        })
    }

    /// Absolute-path URL for `path` under [`app_url`](Self::app_url).
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.app_url, path.trim_start_matches('/'))
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_owned(),
        }),
    }
}
