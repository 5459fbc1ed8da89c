use super::{Store, WindowOutcome};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use redis::aio::{Connection, MultiplexedConnection};
use redis::{Client, RedisError, Script};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const COMPARE_AND_DELETE_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const COMPARE_AND_EXTEND_LUA: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
    return 0
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    ttl = 0
end
return redis.call('PEXPIRE', KEYS[1], ttl + tonumber(ARGV[2]))
"#;

const ZMOVE_TO_LIST_LUA: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

const SMOVE_TO_ZSET_LUA: &str = r#"
redis.call('SREM', KEYS[1], ARGV[1])
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
"#;

const SMOVE_TO_LIST_LUA: &str = r#"
redis.call('SREM', KEYS[1], ARGV[1])
redis.call('RPUSH', KEYS[2], ARGV[1])
return 1
"#;

const SLIDING_WINDOW_LUA: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
if count < limit then
    redis.call('ZADD', KEYS[1], now, ARGV[4])
    redis.call('PEXPIRE', KEYS[1], ARGV[5])
    return {1, count + 1}
end
return {0, count}
"#;

fn map_err(err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().max(1) as u64
}

/// Redis-backed store
///
/// Ordinary commands share one multiplexed connection. Blocking pops run on
/// dedicated connections so they never stall the multiplexed pipeline; those
/// are kept in a small idle pool and reused, so there is at most one per
/// concurrent poller.
///
/// Some scripted operations touch more than one key (`zmove_to_list`,
/// `smove_to_*`); on a Redis Cluster those keys must hash to the same slot.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: MultiplexedConnection,
    blocking: Arc<Mutex<Vec<Connection>>>,
    compare_and_delete: Script,
    compare_and_extend: Script,
    zmove_to_list: Script,
    smove_to_zset: Script,
    smove_to_list: Script,
    sliding_window: Script,
}

impl RedisStore {
    /// Connect to the Redis instance at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err)?;

        tracing::debug!(url = %url, "Connected to redis store");

        Ok(Self {
            client,
            conn,
            blocking: Arc::new(Mutex::new(Vec::new())),
            compare_and_delete: Script::new(COMPARE_AND_DELETE_LUA),
            compare_and_extend: Script::new(COMPARE_AND_EXTEND_LUA),
            zmove_to_list: Script::new(ZMOVE_TO_LIST_LUA),
            smove_to_zset: Script::new(SMOVE_TO_ZSET_LUA),
            smove_to_list: Script::new(SMOVE_TO_LIST_LUA),
            sliding_window: Script::new(SLIDING_WINDOW_LUA),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// Take an idle blocking connection, or open one if none is idle
    async fn checkout_blocking(&self) -> Result<Connection> {
        let idle = self
            .blocking
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .pop();
        match idle {
            Some(conn) => Ok(conn),
            None => self.client.get_async_connection().await.map_err(map_err),
        }
    }

    fn checkin_blocking(&self, conn: Connection) {
        if let Ok(mut idle) = self.blocking.lock() {
            idle.push(conn);
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<_, ()>(&mut self.conn())
            .await
            .map_err(map_err)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let ttl: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        // -2: missing, -1: no expiry
        Ok((ttl >= 0).then(|| Duration::from_millis(ttl as u64)))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async::<_, i64>(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn blpop(&self, keys: &[String], timeout: Duration) -> Result<Option<(String, String)>> {
        if keys.is_empty() {
            return Ok(None);
        }
        // BLPOP treats 0 as "block forever"; a zero timeout means a single pass.
        if timeout.is_zero() {
            let mut conn = self.conn();
            for key in keys {
                let value: Option<String> = redis::cmd("LPOP")
                    .arg(key)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_err)?;
                if let Some(value) = value {
                    return Ok(Some((key.clone(), value)));
                }
            }
            return Ok(None);
        }

        // A connection that errored is dropped rather than returned.
        let mut conn = self.checkout_blocking().await?;
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(keys)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        self.checkin_blocking(conn);
        Ok(popped)
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        let len: usize = redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(len)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(items)
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<usize> {
        let removed: usize = redis::cmd("LREM")
            .arg(key)
            .arg(0)
            .arg(value)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(removed)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async::<_, i64>(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, max: f64, limit: usize) -> Result<Vec<String>> {
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(max)
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(members)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(score)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        let count: usize = redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(count)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        let count: usize = redis::cmd("SCARD")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(count)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let member: bool = redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(member)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(deleted > 0)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        additional: Duration,
    ) -> Result<bool> {
        let extended: i64 = self
            .compare_and_extend
            .key(key)
            .arg(expected)
            .arg(millis(additional))
            .invoke_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(extended > 0)
    }

    async fn zmove_to_list(&self, zset: &str, member: &str, list: &str) -> Result<bool> {
        let moved: i64 = self
            .zmove_to_list
            .key(zset)
            .key(list)
            .arg(member)
            .invoke_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(moved > 0)
    }

    async fn smove_to_zset(&self, set: &str, member: &str, zset: &str, score: f64) -> Result<()> {
        self.smove_to_zset
            .key(set)
            .key(zset)
            .arg(member)
            .arg(score)
            .invoke_async::<_, i64>(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn smove_to_list(&self, set: &str, member: &str, list: &str) -> Result<()> {
        self.smove_to_list
            .key(set)
            .key(list)
            .arg(member)
            .invoke_async::<_, i64>(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn sliding_window(
        &self,
        key: &str,
        member: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
        ttl: Duration,
    ) -> Result<WindowOutcome> {
        let (allowed, count): (i64, i64) = self
            .sliding_window
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as u64)
            .arg(limit)
            .arg(member)
            .arg(millis(ttl))
            .invoke_async(&mut self.conn())
            .await
            .map_err(map_err)?;
        Ok(WindowOutcome {
            allowed: allowed == 1,
            count: count.max(0) as u64,
        })
    }
}
