//! Configuration management with environment variable support.
//!
//! This module provides configuration loading from `.env` files and
//! typed configuration extraction via [`Config<T>`].
//!
//! # Example
//!
//! ```ignore
//! use vesper_extras::config::{Config, Environment, load_dotenv};
//! use vesper_jobs::QueueConfig;
//!
//! // Load .env file at startup
//! load_dotenv();
//!
//! // VESPER_QUEUE_WORKERS=8, VESPER_QUEUE_KEY_PREFIX=church, ...
//! let queue_config = Config::<QueueConfig>::from_env_prefixed("VESPER_QUEUE")?.into_inner();
//! ```

use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

/// Error type for configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable deserialization failed.
    #[error("Configuration error: {0}")]
    EnvyError(#[from] envy::Error),
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
}

/// Deployment profile.
///
/// Detected from the `VESPER_ENV` environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Local development: debug logging, human-readable output.
    Development,
    /// Production: info logging, structured output.
    Production,
    /// Custom environment name for specialized deployments.
    Custom(String),
}

impl Environment {
    /// Detect the current environment from `VESPER_ENV`.
    ///
    /// - `Production` if it is "production" or "prod"
    /// - `Development` if it is "development", "dev", or not set
    /// - `Custom(name)` for any other value
    pub fn current() -> Self {
        match std::env::var("VESPER_ENV").as_deref() {
            Ok("production") | Ok("prod") => Self::Production,
            Ok("development") | Ok("dev") => Self::Development,
            Ok(other) => Self::Custom(other.to_string()),
            Err(_) => Self::Development,
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Get the environment name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Get the default log filter for this environment.
    ///
    /// - Development: "debug"
    /// - Production: "info"
    /// - Custom: "info"
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production => "info",
            Self::Custom(_) => "info",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed configuration deserialized from environment variables.
///
/// Uses the `envy` crate: field names are matched against
/// SCREAMING_SNAKE_CASE variable names.
///
/// # Example
///
/// ```ignore
/// use vesper_extras::config::Config;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct StoreConfig {
///     redis_url: String,  // Reads from REDIS_URL
/// }
///
/// let config = Config::<StoreConfig>::from_env()?;
/// println!("URL: {}", config.redis_url);
/// ```
#[derive(Debug, Clone)]
pub struct Config<T>(pub T);

impl<T: DeserializeOwned> Config<T> {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    /// or if deserialization fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        envy::from_env::<T>().map(Config).map_err(ConfigError::from)
    }

    /// Load configuration with a prefix.
    ///
    /// Only environment variables starting with the given prefix
    /// (followed by underscore) will be considered.
    pub fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
        envy::prefixed(format!("{}_", prefix))
            .from_env::<T>()
            .map(Config)
            .map_err(ConfigError::from)
    }

    /// Get the inner configuration value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Load environment variables from a `.env` file in the current directory.
///
/// A missing file is not an error, and variables already set in the
/// environment take precedence over the file.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Load environment variables from a specific file path.
pub fn load_dotenv_from<P: AsRef<std::path::Path>>(path: P) {
    let _ = dotenvy::from_path(path);
}

/// Read a variable that must be set.
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

/// Get an environment variable with a default value.
pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable and parse it to a specific type.
///
/// ```ignore
/// let workers: usize = env_parse("VESPER_WORKERS").unwrap_or(4);
/// ```
pub fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
