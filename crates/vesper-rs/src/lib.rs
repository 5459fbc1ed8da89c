//! # Vesper
//!
//! Distributed background work for Rust services that share one key-value
//! store.
//!
//! Any number of stateless application instances can enqueue jobs, run
//! schedulers and host worker pools; they coordinate only through the store.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vesper_rs::prelude::*;
//!
//! #[derive(Clone)]
//! struct SendPush;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Push {
//!     device: String,
//!     body: String,
//! }
//!
//! #[async_trait]
//! impl Job for SendPush {
//!     const NAME: &'static str = "push.send";
//!     type Data = Push;
//!
//!     async fn execute(&self, _ctx: JobContext, push: Push) -> Result<serde_json::Value, HandlerError> {
//!         deliver(&push.device, &push.body).await.map_err(|e| HandlerError::with_source("push failed", e))?;
//!         Ok(serde_json::Value::Null)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
//!     let queue = JobQueue::new(store.clone());
//!     queue.register_job(SendPush).await;
//!
//!     let scheduler = Scheduler::spawn(queue.clone());
//!     let workers = WorkerPool::start(queue.clone(), "default", 4)?;
//!
//!     queue.enqueue::<SendPush>(Push { device: "abc".into(), body: "Hello".into() }).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     workers.shutdown().await?;
//!     scheduler.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `redis` - Redis-backed [`Store`](store::Store)
//! - `lock` - Distributed lock (default)
//! - `rate-limit` - Sliding-window rate limiter (default)
//! - `config` - `.env` and environment-variable configuration
//! - `logging` - `tracing-subscriber` initialization
//! - `full` - Everything

// Re-export crates
pub use vesper_extras as extras;
pub use vesper_jobs as jobs;
pub use vesper_store as store;

// Re-export commonly used external crates
pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;

/// Prelude module - import everything you need with `use vesper_rs::prelude::*`
pub mod prelude {
    // Store
    pub use vesper_store::{InMemoryStore, Store, StoreError};

    #[cfg(feature = "redis")]
    pub use vesper_store::RedisStore;

    // Jobs
    pub use vesper_jobs::{
        handler_fn, EnqueueOptions, HandlerError, Job, JobContext, JobError, JobHandler, JobQueue,
        JobRecord, JobStatus, Priority, ProcessOutcome, QueueConfig, QueueStats, Scheduler,
        Shutdown, WorkerPool,
    };

    // Lock
    #[cfg(feature = "lock")]
    pub use vesper_extras::lock::{DistributedLock, LockError, LockOptions, LockToken};

    // Rate limiting
    #[cfg(feature = "rate-limit")]
    pub use vesper_extras::rate_limit::{RateLimitInfo, RateLimitPolicy, RateLimiter};

    // Configuration
    #[cfg(feature = "config")]
    pub use vesper_extras::config::{load_dotenv, Config, ConfigError, Environment};

    // Logging
    #[cfg(feature = "logging")]
    pub use vesper_extras::logging::{init_logging, LogFormat, LoggingConfig};

    // Common dependencies
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
