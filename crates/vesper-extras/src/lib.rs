//! # vesper-extras
//!
//! Coordination primitives and runtime utilities that sit next to the job
//! queue. Everything is opt-in via Cargo feature flags.
//!
//! ## Features
//!
//! - `lock` - [`DistributedLock`](lock::DistributedLock), token-owned mutual exclusion over a shared store
//! - `rate-limit` - [`RateLimiter`](rate_limit::RateLimiter), sliding-window admission control
//! - `config` - Configuration management with `.env` file support
//! - `logging` - `tracing-subscriber` setup with compact, pretty or JSON output
//! - `full` - All features enabled
//!
//! ## Example
//!
//! ```toml
//! [dependencies]
//! vesper-extras = { version = "0.1", features = ["lock", "rate-limit", "config"] }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Distributed lock module
#[cfg(feature = "lock")]
pub mod lock;

// Rate limiting module
#[cfg(feature = "rate-limit")]
pub mod rate_limit;

// Configuration management module
#[cfg(feature = "config")]
pub mod config;

// Logging initialization
#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "lock")]
pub use lock::{DistributedLock, LockError, LockOptions, LockToken};

#[cfg(feature = "rate-limit")]
pub use rate_limit::{RateLimitInfo, RateLimitPolicy, RateLimiter};

#[cfg(feature = "config")]
pub use config::{
    env_or, env_parse, load_dotenv, load_dotenv_from, require_env, Config, ConfigError,
    Environment,
};

#[cfg(feature = "logging")]
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
