//! Sliding-window rate limiting.
//!
//! Each scope key owns a sorted set of event timestamps. A check prunes
//! events older than the window, counts what is left and records the new
//! event only if the count is below the limit, all in one atomic store
//! operation. The window slides continuously, so there are no bursts at
//! fixed bucket boundaries.
//!
//! The limiter fails **open**: if the store cannot be reached the event is
//! allowed and a warning is logged.
//!
//! # Example
//!
//! ```ignore
//! use vesper_extras::rate_limit::RateLimiter;
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(store.clone());
//!
//! // Allow 100 requests per minute per user
//! let info = limiter.check(&format!("api:{user_id}"), 100, Duration::from_secs(60)).await;
//! if !info.allowed {
//!     return Err(TooManyRequests(info.retry_after));
//! }
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vesper_store::Store;

/// Extra lifetime of a window key past its window, so a key is not
/// dropped while its newest entry still counts.
const KEY_TTL_BUFFER: Duration = Duration::from_secs(1);

/// Rate limit information for a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Whether the event was admitted.
    pub allowed: bool,
    /// Maximum events allowed per window.
    pub limit: u64,
    /// Events still available in the current window.
    pub remaining: u64,
    /// When denied, how long to wait before trying again.
    pub retry_after: Option<Duration>,
    /// Unix timestamp (seconds) at which the window fully resets.
    pub reset: u64,
}

/// Sliding-window limiter over a shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    prefix: String,
}

impl RateLimiter {
    /// Create a limiter with the default `vesper` key prefix.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_prefix(store, "vesper")
    }

    /// Create a limiter writing keys under `{prefix}:ratelimit:`.
    pub fn with_prefix(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:ratelimit:{}", self.prefix, key)
    }

    /// Record an event for `key` if fewer than `limit` happened in the
    /// trailing `window`.
    ///
    /// Denied checks report `retry_after = window`.
    pub async fn check(&self, key: &str, limit: u64, window: Duration) -> RateLimitInfo {
        let now_ms = Utc::now().timestamp_millis();
        let reset = (now_ms as u64 / 1000) + window.as_secs();
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        let outcome = self
            .store
            .sliding_window(
                &self.key(key),
                &member,
                now_ms,
                window,
                limit,
                window + KEY_TTL_BUFFER,
            )
            .await;

        match outcome {
            Ok(outcome) if outcome.allowed => RateLimitInfo {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(outcome.count),
                retry_after: None,
                reset,
            },
            Ok(_) => {
                tracing::debug!(key = %key, limit, "Rate limit exceeded");
                RateLimitInfo {
                    allowed: false,
                    limit,
                    remaining: 0,
                    retry_after: Some(window),
                    reset,
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limiter store unavailable, allowing");
                RateLimitInfo {
                    allowed: true,
                    limit,
                    remaining: limit,
                    retry_after: None,
                    reset,
                }
            }
        }
    }

    /// Forget every recorded event for `key`.
    pub async fn reset(&self, key: &str) -> Result<(), vesper_store::StoreError> {
        self.store.del(&self.key(key)).await?;
        Ok(())
    }
}

/// A named limit and window pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum events per window.
    pub limit: u64,
    /// Trailing window length.
    pub window: Duration,
}

impl RateLimitPolicy {
    /// Create a policy.
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    /// `limit` events per second.
    pub const fn per_second(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    /// `limit` events per minute.
    pub const fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// `limit` events per hour.
    pub const fn per_hour(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// Check `key` against this policy.
    pub async fn check(&self, limiter: &RateLimiter, key: &str) -> RateLimitInfo {
        limiter.check(key, self.limit, self.window).await
    }
}
