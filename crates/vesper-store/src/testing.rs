//! Test doubles for code built on [`Store`]

use crate::backend::{Store, WindowOutcome};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::time::Duration;

/// A store whose every operation fails with [`StoreError::Unavailable`]
///
/// Useful for checking fail-open / fail-closed behavior of callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

fn down<T>() -> Result<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl Store for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        down()
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        down()
    }

    async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool> {
        down()
    }

    async fn del(&self, _key: &str) -> Result<bool> {
        down()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
        down()
    }

    async fn rpush(&self, _key: &str, _value: &str) -> Result<()> {
        down()
    }

    async fn blpop(
        &self,
        _keys: &[String],
        _timeout: Duration,
    ) -> Result<Option<(String, String)>> {
        down()
    }

    async fn llen(&self, _key: &str) -> Result<usize> {
        down()
    }

    async fn lrange(&self, _key: &str, _start: isize, _stop: isize) -> Result<Vec<String>> {
        down()
    }

    async fn lrem(&self, _key: &str, _value: &str) -> Result<usize> {
        down()
    }

    async fn zadd(&self, _key: &str, _member: &str, _score: f64) -> Result<()> {
        down()
    }

    async fn zrangebyscore(&self, _key: &str, _max: f64, _limit: usize) -> Result<Vec<String>> {
        down()
    }

    async fn zscore(&self, _key: &str, _member: &str) -> Result<Option<f64>> {
        down()
    }

    async fn zrem(&self, _key: &str, _member: &str) -> Result<bool> {
        down()
    }

    async fn zcard(&self, _key: &str) -> Result<usize> {
        down()
    }

    async fn sadd(&self, _key: &str, _member: &str) -> Result<bool> {
        down()
    }

    async fn srem(&self, _key: &str, _member: &str) -> Result<bool> {
        down()
    }

    async fn scard(&self, _key: &str) -> Result<usize> {
        down()
    }

    async fn sismember(&self, _key: &str, _member: &str) -> Result<bool> {
        down()
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> Result<bool> {
        down()
    }

    async fn compare_and_extend(
        &self,
        _key: &str,
        _expected: &str,
        _additional: Duration,
    ) -> Result<bool> {
        down()
    }

    async fn zmove_to_list(&self, _zset: &str, _member: &str, _list: &str) -> Result<bool> {
        down()
    }

    async fn smove_to_zset(
        &self,
        _set: &str,
        _member: &str,
        _zset: &str,
        _score: f64,
    ) -> Result<()> {
        down()
    }

    async fn smove_to_list(&self, _set: &str, _member: &str, _list: &str) -> Result<()> {
        down()
    }

    async fn sliding_window(
        &self,
        _key: &str,
        _member: &str,
        _now_ms: i64,
        _window: Duration,
        _limit: u64,
        _ttl: Duration,
    ) -> Result<WindowOutcome> {
        down()
    }
}
