//! In-process [`Store`] for tests and single-node use.
//!
//! Expiry is enforced lazily: every access first drops keys whose deadline,
//! measured by the injected [`Clock`], has passed. Sorted-set ranges order by
//! score, then by member, like Redis.

use async_trait::async_trait;
use kx_common::{Clock, KxError, Result, SystemClock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::{Store, Ttl};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<String, Entry>,
    sorted_sets: HashMap<String, HashMap<String, i64>>,
    failing: HashSet<&'static str>,
}

impl Inner {
    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing.contains(op) {
            return Err(KxError::Store(format!("injected failure in {}", op)));
        }
        Ok(())
    }

    fn live_entry(&mut self, key: &str, now_ms: i64) -> Option<&mut Entry> {
        let expired = matches!(
            self.keys.get(key),
            Some(Entry { expires_at_ms: Some(at), .. }) if *at <= now_ms
        );
        if expired {
            self.keys.remove(key);
        }
        self.keys.get_mut(key)
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Whether `key` currently exists and has not expired.
    pub async fn contains_key(&self, key: &str) -> bool {
        let now_ms = self.now_ms();
        self.inner.lock().await.live_entry(key, now_ms).is_some()
    }

    /// Number of members in a sorted set.
    pub async fn sorted_set_len(&self, key: &str) -> usize {
        self.inner.lock().await.sorted_sets.get(key).map_or(0, HashMap::len)
    }

    /// Make every call to the named operation (e.g. `"zadd"`) fail with a store error.
    pub async fn inject_failure(&self, op: &'static str) {
        self.inner.lock().await.failing.insert(op);
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.failing.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock().await;
        inner.check("set_nx")?;
        if inner.live_entry(key, now_ms).is_some() {
            return Ok(false);
        }
        inner.keys.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock().await;
        inner.check("expire")?;
        if seconds <= 0 {
            inner.keys.remove(key);
            return Ok(());
        }
        if let Some(entry) = inner.live_entry(key, now_ms) {
            entry.expires_at_ms = Some(now_ms.saturating_add(seconds.saturating_mul(1000)));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock().await;
        inner.check("ttl")?;
        Ok(match inner.live_entry(key, now_ms) {
            None => Ttl::Missing,
            Some(Entry { expires_at_ms: None, .. }) => Ttl::Persistent,
            Some(Entry { expires_at_ms: Some(at), .. }) => Ttl::Expires((*at - now_ms + 999) / 1000),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now_ms = self.now_ms();
        let mut inner = self.inner.lock().await;
        inner.check("get")?;
        Ok(inner.live_entry(key, now_ms).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check("delete")?;
        inner.keys.remove(key);
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>> {
        let inner = self.inner.lock().await;
        inner.check("zscore")?;
        Ok(inner.sorted_sets.get(key).and_then(|set| set.get(member).copied()))
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check("zadd")?;
        inner
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check("zrem")?;
        let now_empty = match inner.sorted_sets.get_mut(key) {
            Some(set) => {
                set.remove(member);
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.sorted_sets.remove(key);
        }
        Ok(())
    }

    async fn zrange_withscores(&self, key: &str, start: isize, stop: isize) -> Result<Vec<(String, i64)>> {
        let inner = self.inner.lock().await;
        inner.check("zrange_withscores")?;
        let Some(set) = inner.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut members: Vec<(String, i64)> = set.iter().map(|(m, s)| (m.clone(), *s)).collect();
        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        Ok(match normalize_range(members.len(), start, stop) {
            Some((from, to)) => members[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.inner.lock().await.check("ping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_common::ManualClock;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_unix_seconds(1_700_000_000));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_nx_only_creates_once() {
        let (store, _) = store_with_clock();

        assert!(store.set_nx("kx:a", "10").await.unwrap());
        assert!(!store.set_nx("kx:a", "20").await.unwrap());
        assert_eq!(store.get("kx:a").await.unwrap().as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_ttl_reports_missing_persistent_and_remaining() {
        let (store, clock) = store_with_clock();

        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Missing);

        store.set_nx("kx:a", "10").await.unwrap();
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Persistent);

        store.expire("kx:a", 10).await.unwrap();
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Expires(10));

        clock.advance_secs(4);
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Expires(6));
    }

    #[tokio::test]
    async fn test_keys_disappear_once_expiry_elapses() {
        let (store, clock) = store_with_clock();

        store.set_nx("kx:a", "2").await.unwrap();
        store.expire("kx:a", 2).await.unwrap();

        clock.advance_secs(1);
        assert!(store.contains_key("kx:a").await);

        clock.advance_secs(1);
        assert!(!store.contains_key("kx:a").await);
        assert_eq!(store.get("kx:a").await.unwrap(), None);
        assert!(store.set_nx("kx:a", "5").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_overwrites_previous_expiry() {
        let (store, clock) = store_with_clock();

        store.set_nx("kx:a", "1").await.unwrap();
        store.expire("kx:a", 1).await.unwrap();
        store.expire("kx:a", 30).await.unwrap();

        clock.advance_secs(5);
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Expires(25));
    }

    #[tokio::test]
    async fn test_non_positive_expire_deletes_key() {
        let (store, _) = store_with_clock();

        store.set_nx("kx:a", "1").await.unwrap();
        store.expire("kx:a", 0).await.unwrap();

        assert!(!store.contains_key("kx:a").await);
    }

    #[tokio::test]
    async fn test_zscore_distinguishes_absent_from_zero() {
        let (store, _) = store_with_clock();

        store.zadd("Queue:q", "1", 0).await.unwrap();

        assert_eq!(store.zscore("Queue:q", "1").await.unwrap(), Some(0));
        assert_eq!(store.zscore("Queue:q", "2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zrange_orders_by_score_then_member() {
        let (store, _) = store_with_clock();

        store.zadd("Queue:q", "30", 300).await.unwrap();
        store.zadd("Queue:q", "b", 100).await.unwrap();
        store.zadd("Queue:q", "a", 100).await.unwrap();
        store.zadd("Queue:q", "20", 200).await.unwrap();

        let all = store.zrange_withscores("Queue:q", 0, -1).await.unwrap();
        assert_eq!(
            all,
            vec![
                ("a".to_string(), 100),
                ("b".to_string(), 100),
                ("20".to_string(), 200),
                ("30".to_string(), 300),
            ]
        );

        let head = store.zrange_withscores("Queue:q", 0, 1).await.unwrap();
        assert_eq!(head.len(), 2);

        let past_end = store.zrange_withscores("Queue:q", 2, 100).await.unwrap();
        assert_eq!(past_end.len(), 2);

        assert!(store.zrange_withscores("Queue:q", 5, 10).await.unwrap().is_empty());
        assert!(store.zrange_withscores("Queue:none", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zadd_upserts_and_zrem_is_noop_when_absent() {
        let (store, _) = store_with_clock();

        store.zadd("Queue:q", "7", 10).await.unwrap();
        store.zadd("Queue:q", "7", 20).await.unwrap();
        assert_eq!(store.sorted_set_len("Queue:q").await, 1);
        assert_eq!(store.zscore("Queue:q", "7").await.unwrap(), Some(20));

        store.zrem("Queue:q", "8").await.unwrap();
        store.zrem("Queue:q", "7").await.unwrap();
        store.zrem("Queue:q", "7").await.unwrap();
        assert_eq!(store.sorted_set_len("Queue:q").await, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_only_hits_named_operation() {
        let (store, _) = store_with_clock();
        store.inject_failure("zadd").await;

        assert!(store.zadd("Queue:q", "1", 1).await.unwrap_err().is_store());
        assert!(store.set_nx("kx:a", "1").await.unwrap());

        store.clear_failures().await;
        store.zadd("Queue:q", "1", 1).await.unwrap();
    }
}
