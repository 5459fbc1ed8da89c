//! Distributed mutual exclusion over a shared store.
//!
//! A lock is a single key holding a random token, written with
//! set-if-absent plus an expiry. Only the caller presenting that exact token
//! can release or extend it, and both checks run as one atomic
//! compare-and-mutate in the store.
//!
//! The lock is best-effort: a holder that pauses past its timeout (GC, a
//! network partition, clock skew between store replicas) silently loses
//! ownership while still believing it holds the lock. Critical sections
//! should be idempotent or fenced by other means.
//!
//! # Example
//!
//! ```ignore
//! use vesper_extras::lock::{DistributedLock, LockOptions};
//!
//! let lock = DistributedLock::new(store.clone());
//! if let Some(token) = lock.acquire("report:2024-06", &LockOptions::default()).await? {
//!     generate_report().await;
//!     lock.release(token.name(), token.token()).await?;
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;
use vesper_store::{Store, StoreError};

/// Error type for lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// A blocking acquire did not obtain the lock before `blocking_timeout`.
    ///
    /// Callers should treat this as "resource busy".
    #[error("Could not acquire lock '{name}' within {waited:?}")]
    AcquisitionFailed {
        /// Lock name
        name: String,
        /// How long the caller waited
        waited: Duration,
    },

    /// The options cannot produce a usable lock.
    #[error("Invalid lock options: {0}")]
    InvalidOptions(String),

    /// The store failed; lock operations never assume success.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Options for [`DistributedLock::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// How long the lock lives unless released or extended.
    pub timeout: Duration,
    /// Keep retrying while the lock is held by someone else.
    pub blocking: bool,
    /// Upper bound on the time spent retrying in blocking mode.
    pub blocking_timeout: Duration,
    /// Pause between retries in blocking mode.
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            blocking: false,
            blocking_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(100),
        }
    }
}

impl LockOptions {
    /// Create options with the defaults (30s timeout, non-blocking).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for the lock for at most `blocking_timeout`.
    pub fn blocking(mut self, blocking_timeout: Duration) -> Self {
        self.blocking = true;
        self.blocking_timeout = blocking_timeout;
        self
    }

    /// Set the pause between retries in blocking mode.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn validate(&self) -> Result<(), LockError> {
        if self.timeout < Duration::from_millis(1) {
            return Err(LockError::InvalidOptions(
                "timeout must be at least 1ms".into(),
            ));
        }
        if self.blocking && self.retry_interval.is_zero() {
            return Err(LockError::InvalidOptions(
                "retry_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Proof of ownership returned by a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    name: String,
    token: String,
}

impl LockToken {
    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The random token identifying this holder.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Token-owned mutual exclusion across processes sharing a store.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn Store>,
    prefix: String,
}

impl DistributedLock {
    /// Create a lock service with the default `vesper` key prefix.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_prefix(store, "vesper")
    }

    /// Create a lock service writing keys under `{prefix}:lock:`.
    pub fn with_prefix(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.prefix, name)
    }

    /// Try to take the lock `name`.
    ///
    /// - Non-blocking: `Ok(None)` when someone else holds it.
    /// - Blocking: retries every `retry_interval` until it succeeds or
    ///   `blocking_timeout` elapses, then fails with
    ///   [`LockError::AcquisitionFailed`].
    pub async fn acquire(
        &self,
        name: &str,
        opts: &LockOptions,
    ) -> Result<Option<LockToken>, LockError> {
        opts.validate()?;
        let key = self.key(name);
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            if self.store.set_nx_ex(&key, &token, opts.timeout).await? {
                tracing::debug!(lock = %name, "Lock acquired");
                return Ok(Some(LockToken {
                    name: name.to_string(),
                    token,
                }));
            }

            if !opts.blocking {
                tracing::debug!(lock = %name, "Lock busy");
                return Ok(None);
            }

            let waited = started.elapsed();
            if waited >= opts.blocking_timeout {
                tracing::warn!(
                    lock = %name,
                    waited_ms = waited.as_millis() as u64,
                    "Lock acquisition timed out"
                );
                return Err(LockError::AcquisitionFailed {
                    name: name.to_string(),
                    waited,
                });
            }
            let remaining = opts.blocking_timeout - waited;
            tokio::time::sleep(opts.retry_interval.min(remaining)).await;
        }
    }

    /// Release the lock if `token` still owns it.
    ///
    /// Returns `false` for a foreign or stale token; the lock is untouched.
    pub async fn release(&self, name: &str, token: &str) -> Result<bool, LockError> {
        let released = self.store.compare_and_delete(&self.key(name), token).await?;
        if released {
            tracing::debug!(lock = %name, "Lock released");
        } else {
            tracing::debug!(lock = %name, "Release ignored, token does not own the lock");
        }
        Ok(released)
    }

    /// Push the expiry of a held lock out by `additional`.
    ///
    /// Returns `false` if `token` no longer owns the lock.
    pub async fn extend(
        &self,
        name: &str,
        token: &str,
        additional: Duration,
    ) -> Result<bool, LockError> {
        Ok(self
            .store
            .compare_and_extend(&self.key(name), token, additional)
            .await?)
    }

    /// Run `f` while holding the lock, releasing it afterwards.
    ///
    /// Returns `Ok(None)` without running `f` if a non-blocking acquire
    /// finds the lock busy. A failed release is logged and does not hide
    /// the result of `f`; the lock then lapses at its timeout.
    pub async fn with_lock<F, Fut, T>(
        &self,
        name: &str,
        opts: &LockOptions,
        f: F,
    ) -> Result<Option<T>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(held) = self.acquire(name, opts).await? else {
            return Ok(None);
        };

        let output = f().await;

        match self.release(held.name(), held.token()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(lock = %name, "Lock expired before the critical section finished")
            }
            Err(e) => tracing::warn!(lock = %name, error = %e, "Failed to release lock"),
        }
        Ok(Some(output))
    }
}
