use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// Result of a sliding-window admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether the event was admitted (and recorded)
    pub allowed: bool,
    /// Events inside the window after the attempt
    pub count: u64,
}

/// Backend storage shared by every Vesper service
///
/// Each method is a single round-trip and is atomic on its own. The
/// compound operations at the bottom of the trait (`compare_and_*`,
/// `zmove_to_list`, `smove_to_*`, `sliding_window`) must execute as one
/// indivisible step; the Redis backend implements them as Lua scripts.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a string value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value with an expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write a string value with an expiry only if the key is absent.
    /// Returns `true` if the value was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete a key of any type. Returns `true` if it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Remaining time to live, `None` if the key is missing or never expires
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Append to the tail of a list
    async fn rpush(&self, key: &str, value: &str) -> Result<()>;

    /// Pop the head of the first non-empty list, checking `keys` in order.
    ///
    /// Waits up to `timeout` for an element to arrive. Returns the list key
    /// the element came from together with the element.
    async fn blpop(&self, keys: &[String], timeout: Duration) -> Result<Option<(String, String)>>;

    async fn llen(&self, key: &str) -> Result<usize>;

    /// Range of a list, inclusive on both ends, negative indexes count from the tail
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// Remove every occurrence of `value`. Returns the number removed.
    async fn lrem(&self, key: &str, value: &str) -> Result<usize>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Members with `score <= max`, ascending by score, at most `limit`
    async fn zrangebyscore(&self, key: &str, max: f64, limit: usize) -> Result<Vec<String>>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool>;

    async fn zcard(&self, key: &str) -> Result<usize>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    async fn scard(&self, key: &str) -> Result<usize>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// Delete `key` only if its value equals `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Add `additional` to the remaining TTL of `key` only if its value equals `expected`
    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        additional: Duration,
    ) -> Result<bool>;

    /// Remove `member` from the sorted set and append it to `list`, but only
    /// if it was still present in the sorted set.
    async fn zmove_to_list(&self, zset: &str, member: &str, list: &str) -> Result<bool>;

    /// Remove `member` from `set` and add it to the sorted set with `score`.
    ///
    /// The add happens whether or not `member` was in `set`.
    async fn smove_to_zset(&self, set: &str, member: &str, zset: &str, score: f64) -> Result<()>;

    /// Remove `member` from `set` and append it to `list`.
    ///
    /// The push happens whether or not `member` was in `set`.
    async fn smove_to_list(&self, set: &str, member: &str, list: &str) -> Result<()>;

    /// Sliding-window admission for `key`.
    ///
    /// Drops entries scored at or before `now_ms - window`, counts the rest,
    /// and records `member` at `now_ms` only if the count is below `limit`.
    /// The key expires after `ttl` of inactivity.
    async fn sliding_window(
        &self,
        key: &str,
        member: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
        ttl: Duration,
    ) -> Result<WindowOutcome>;
}
