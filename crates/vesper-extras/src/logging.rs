//! Process-wide `tracing` subscriber setup.
//!
//! Libraries in this workspace only emit events; binaries call
//! [`init_logging`] once at startup to decide where they go.
//!
//! # Example
//!
//! ```rust,no_run
//! use vesper_extras::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! init_logging(&LoggingConfig::new().format(LogFormat::Json)).unwrap();
//! tracing::info!(queue = "webhooks", "worker started");
//! ```

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact format (one line per event)
    #[default]
    Compact,
    /// Pretty multi-line format for local development
    Pretty,
    /// JSON format (structured logging)
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// The rejected directive
        filter: String,
        /// Parser message
        reason: String,
    },
    /// Unrecognized format name.
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive, used when `RUST_LOG` is unset
    pub filter: String,
    /// Whether to print event targets (module paths)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "info".to_string(),
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Create a configuration with the defaults (compact, `info`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the default filter directive.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Show or hide event targets.
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.filter).map_err(|e| LoggingError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured filter. Safe to call more than once:
/// later calls leave the first subscriber in place and return `Ok(false)`.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    Ok(installed)
}
