//! Shared key-value store for Vesper
//!
//! Every Vesper service (job queue, distributed lock, rate limiter) coordinates
//! exclusively through a [`Store`]. The trait exposes list, sorted-set, set and
//! string primitives plus a handful of atomic check-and-mutate operations that
//! the higher layers rely on for correctness.
//!
//! Two backends ship with the crate:
//!
//! - [`InMemoryStore`] - a process-local store for tests and single-node setups
//! - `RedisStore` - a Redis-backed store (enable the `redis` feature)

pub mod backend;
pub mod error;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::memory::InMemoryStore;
pub use backend::{Store, WindowOutcome};
pub use error::{Result, StoreError};

#[cfg(feature = "redis")]
pub use backend::redis::RedisStore;
