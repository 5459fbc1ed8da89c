use super::{Store, WindowOutcome};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How often a full pass drops expired keys nobody reads again
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// In-memory store (not persistent, for testing/dev)
///
/// Clones share the same state, so several services built from clones of one
/// `InMemoryStore` behave like separate processes sharing one Redis. All
/// operations run under a single mutex, which makes every trait method atomic.
///
/// Expired keys are dropped when touched, and at most once per second every
/// expired key is swept so records and windows that are never read again do
/// not accumulate.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    pushed: Arc<Notify>,
}

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    sets: HashMap<String, HashSet<String>>,
    expiries: HashMap<String, Instant>,
    last_sweep: Option<Instant>,
}

impl State {
    /// Lazily drop `key` if its expiry has passed
    fn evict(&mut self, key: &str) {
        let expired = self
            .expiries
            .get(key)
            .map_or(false, |at| *at <= Instant::now());
        if expired {
            self.remove(key);
        }
    }

    /// Drop every expired key if a sweep is due
    fn sweep(&mut self) {
        let now = Instant::now();
        if self
            .last_sweep
            .map_or(false, |at| now.saturating_duration_since(at) < SWEEP_INTERVAL)
        {
            return;
        }
        self.last_sweep = Some(now);

        let expired: Vec<String> = self
            .expiries
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        if !expired.is_empty() {
            tracing::trace!(evicted = expired.len(), "Swept expired keys");
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.expiries.remove(key);
        let string = self.strings.remove(key).is_some();
        let list = self.lists.remove(key).is_some();
        let zset = self.zsets.remove(key).is_some();
        let set = self.sets.remove(key).is_some();
        string || list || zset || set
    }

    fn exists(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.lists.contains_key(key)
            || self.zsets.contains_key(key)
            || self.sets.contains_key(key)
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        self.expiries.insert(key.to_string(), Instant::now() + ttl);
    }

    fn remaining(&self, key: &str) -> Option<Duration> {
        self.expiries
            .get(key)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    // Empty collections do not exist, mirroring Redis.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = self.lists.get(key).map_or(false, VecDeque::is_empty)
            || self.zsets.get(key).map_or(false, HashMap::is_empty)
            || self.sets.get(key).map_or(false, HashSet::is_empty);
        if empty {
            self.remove(key);
        }
    }

    fn pop_first(&mut self, keys: &[String]) -> Option<(String, String)> {
        for key in keys {
            self.evict(key);
            if let Some(value) = self.lists.get_mut(key).and_then(VecDeque::pop_front) {
                self.drop_if_empty(key);
                return Some((key.clone(), value));
            }
        }
        None
    }

    fn push(&mut self, key: &str, value: &str) {
        self.evict(key);
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
    }
}

/// Resolve Redis-style inclusive list bounds against a list of `len` items
fn list_bounds(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        state.sweep();
        Ok(state)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state.strings.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state()?;
        state.remove(key);
        state.strings.insert(key.to_string(), value.to_string());
        state.expire(key, ttl);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        if state.exists(key) {
            return Ok(false);
        }
        state.strings.insert(key.to_string(), value.to_string());
        state.expire(key, ttl);
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state.remove(key))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut state = self.state()?;
        state.evict(key);
        if !state.exists(key) {
            return Ok(None);
        }
        Ok(state.remaining(key))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        self.state()?.push(key, value);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blpop(&self, keys: &[String], timeout: Duration) -> Result<Option<(String, String)>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before looking so a push between the check
            // and the wait still wakes us.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let hit = self.state()?.pop_first(keys);
            if hit.is_some() {
                return Ok(hit);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut state = self.state()?;
        state.evict(key);
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match list_bounds(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<usize> {
        let mut state = self.state()?;
        state.evict(key);
        let removed = match state.lists.get_mut(key) {
            Some(list) => {
                let before = list.len();
                list.retain(|item| item != value);
                before - list.len()
            }
            None => 0,
        };
        state.drop_if_empty(key);
        Ok(removed)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut state = self.state()?;
        state.evict(key);
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, max: f64, limit: usize) -> Result<Vec<String>> {
        let mut state = self.state()?;
        state.evict(key);
        let Some(zset) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<(&String, f64)> = zset
            .iter()
            .filter(|(_, score)| **score <= max)
            .map(|(member, score)| (member, *score))
            .collect();
        due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(due
            .into_iter()
            .take(limit)
            .map(|(member, _)| member.clone())
            .collect())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state
            .zsets
            .get(key)
            .and_then(|zset| zset.get(member).copied()))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        let removed = state
            .zsets
            .get_mut(key)
            .map_or(false, |zset| zset.remove(member).is_some());
        state.drop_if_empty(key);
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state.zsets.get(key).map_or(0, HashMap::len))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        let removed = state
            .sets
            .get_mut(key)
            .map_or(false, |set| set.remove(member));
        state.drop_if_empty(key);
        Ok(removed)
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state.sets.get(key).map_or(0, HashSet::len))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        Ok(state
            .sets
            .get(key)
            .map_or(false, |set| set.contains(member)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        if state.strings.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        Ok(state.remove(key))
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        additional: Duration,
    ) -> Result<bool> {
        let mut state = self.state()?;
        state.evict(key);
        if state.strings.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        let remaining = state.remaining(key).unwrap_or_default();
        state.expire(key, remaining + additional);
        Ok(true)
    }

    async fn zmove_to_list(&self, zset: &str, member: &str, list: &str) -> Result<bool> {
        {
            let mut state = self.state()?;
            state.evict(zset);
            let removed = state
                .zsets
                .get_mut(zset)
                .map_or(false, |entries| entries.remove(member).is_some());
            if !removed {
                return Ok(false);
            }
            state.drop_if_empty(zset);
            state.push(list, member);
        }
        self.pushed.notify_waiters();
        Ok(true)
    }

    async fn smove_to_zset(&self, set: &str, member: &str, zset: &str, score: f64) -> Result<()> {
        let mut state = self.state()?;
        state.evict(set);
        state.evict(zset);
        if let Some(members) = state.sets.get_mut(set) {
            members.remove(member);
        }
        state.drop_if_empty(set);
        state
            .zsets
            .entry(zset.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn smove_to_list(&self, set: &str, member: &str, list: &str) -> Result<()> {
        {
            let mut state = self.state()?;
            state.evict(set);
            if let Some(members) = state.sets.get_mut(set) {
                members.remove(member);
            }
            state.drop_if_empty(set);
            state.push(list, member);
        }
        self.pushed.notify_waiters();
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
        let mut state = self.state()?;
        state.evict(key);
        let cutoff = (now_ms - window.as_millis() as i64) as f64;
        let entries = state.zsets.entry(key.to_string()).or_default();
        entries.retain(|_, score| *score > cutoff);

        let count = entries.len() as u64;
        if count < limit {
            entries.insert(member.to_string(), now_ms as f64);
            state.expire(key, ttl);
            return Ok(WindowOutcome {
                allowed: true,
                count: count + 1,
            });
        }
        state.drop_if_empty(key);
        Ok(WindowOutcome {
            allowed: false,
            count,
        })
    }
}
