//! Background job processing for Vesper
//!
//! This crate provides at-least-once, priority-ordered job delivery on top of
//! a shared [`Store`](vesper_store::Store):
//!
//! - [`JobQueue`] writes job records and pushes ids onto per-priority ready lists
//! - [`Scheduler`] promotes delayed and retrying jobs once they are due
//! - [`WorkerPool`] runs concurrent consumers that dispatch to registered handlers
//!
//! Failed jobs are retried with exponential backoff and land in a per-queue
//! dead-letter list once their retries are exhausted.

pub mod config;
pub mod error;
pub mod job;
pub mod keys;
pub mod queue;
pub mod record;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use config::QueueConfig;
pub use error::{JobError, Result};
pub use job::{handler_fn, HandlerError, Job, JobContext, JobHandler};
pub use keys::Keyspace;
pub use queue::{EnqueueOptions, JobQueue, PriorityCounts, ProcessOutcome, QueueStats};
pub use record::{JobRecord, JobStatus, Priority, MAX_BACKOFF};
pub use scheduler::Scheduler;
pub use shutdown::Shutdown;
pub use worker::WorkerPool;
