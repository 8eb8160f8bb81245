//! Self-expiring named locks on top of a shared [`Store`].
//!
//! Acquisition is two separate round-trips: `SETNX` creates the record, then
//! `EXPIRE` arms its auto-release. A holder that dies between the two leaves
//! a record with no expiry; the next acquirer sees `Ttl::Persistent` and
//! adopts it immediately. Once armed, the store's expiry is what frees the
//! lock of a crashed holder.
//!
//! Release is an unconditional delete. Without a fencing token, a handle
//! whose lock already expired and was taken by someone else will delete the
//! new holder's record.

use kx_common::{Clock, KxError, Result, SystemClock};
use kx_storage::{Store, Ttl};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const LOCK_KEY_PREFIX: &str = "kx:";

/// Store key of the record for lock `name`.
pub fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, name)
}

/// What this handle believes about a lock it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldLock {
    /// Absolute expiry in epoch seconds, computed at acquisition and moved by renewals.
    pub expire_at: i64,
    /// The record value this handle wrote or adopted.
    pub token: String,
}

/// A per-client lock handle.
///
/// The table of held locks is owned by the handle and every mutating method
/// takes `&mut self`. Share a handle across tasks only behind a mutex.
pub struct LockManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    held: HashMap<String, HeldLock>,
}

impl LockManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            held: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Try to acquire `name`, polling every `poll_interval_micros` for up to
    /// `wait_timeout_secs` while someone else holds it.
    ///
    /// Returns `Ok(false)` when the lock stayed contended until the deadline
    /// (immediately if `wait_timeout_secs <= 0`). Store failures abort with an
    /// error and are not retried.
    pub async fn acquire(
        &mut self,
        name: &str,
        wait_timeout_secs: i64,
        expire_secs: i64,
        poll_interval_micros: u64,
    ) -> Result<bool> {
        validate_name(name)?;
        if expire_secs <= 0 {
            tracing::warn!(lock = name, expire_secs, "Lock requested without a positive expiry; it will not self-release");
        }

        let key = lock_key(name);
        let token = expire_secs.to_string();
        let start = self.clock.now();
        let deadline_ms = start
            .timestamp_millis()
            .saturating_add(wait_timeout_secs.saturating_mul(1000));
        let expire_at = start.timestamp().saturating_add(expire_secs);
        let poll_interval = Duration::from_micros(poll_interval_micros);

        loop {
            if self.store.set_nx(&key, &token).await? {
                if let Err(e) = self.arm_expiry(&key, expire_secs).await {
                    tracing::warn!(lock = name, "Created lock record but failed to arm its expiry: {}", e);
                    return Err(e);
                }
                self.held.insert(name.to_string(), HeldLock { expire_at, token });
                tracing::debug!(lock = name, expire_at, "Lock acquired");
                return Ok(true);
            }

            match self.store.ttl(&key).await? {
                Ttl::Persistent => {
                    // Previous holder created the record and died before arming it.
                    let Some(existing) = self.store.get(&key).await? else {
                        continue;
                    };
                    self.arm_expiry(&key, expire_secs).await?;
                    tracing::warn!(lock = name, "Adopted abandoned lock record with no expiry");
                    self.held.insert(
                        name.to_string(),
                        HeldLock {
                            expire_at,
                            token: existing,
                        },
                    );
                    return Ok(true);
                }
                // Released between our SETNX and TTL; try again straight away.
                Ttl::Missing => continue,
                Ttl::Expires(remaining) => {
                    if wait_timeout_secs <= 0 || self.clock.now().timestamp_millis() >= deadline_ms {
                        tracing::debug!(lock = name, remaining, "Lock held elsewhere, giving up");
                        return Ok(false);
                    }
                    self.clock.sleep(poll_interval).await;
                }
            }
        }
    }

    /// Release a lock this handle holds.
    ///
    /// `Ok(false)` if the handle does not hold `name`; the store is not touched.
    /// The delete is unconditional, see the module docs.
    pub async fn release(&mut self, name: &str) -> Result<bool> {
        if !self.held.contains_key(name) {
            return Ok(false);
        }

        self.store.delete(&lock_key(name)).await?;
        self.held.remove(name);
        tracing::debug!(lock = name, "Lock released");
        Ok(true)
    }

    /// Release every lock this handle holds. Attempts all of them and returns
    /// true only if each release succeeded.
    pub async fn release_all(&mut self) -> bool {
        let names: Vec<String> = self.held.keys().cloned().collect();
        let mut all_released = true;

        for name in names {
            match self.release(&name).await {
                Ok(true) => {}
                Ok(false) => all_released = false,
                Err(e) => {
                    tracing::warn!(lock = %name, "Failed to release lock: {}", e);
                    all_released = false;
                }
            }
        }

        all_released
    }

    /// Extend a held lock by `additional_secs` past its currently recorded expiry.
    ///
    /// Renewals compose with the instant computed at acquisition, not with the
    /// current time. `Ok(false)` if the lock is not held.
    pub async fn renew(&mut self, name: &str, additional_secs: i64) -> Result<bool> {
        if additional_secs <= 0 {
            return Err(KxError::invalid(format!(
                "renewal must be > 0 seconds, got {}",
                additional_secs
            )));
        }
        if !self.is_held(name).await? {
            return Ok(false);
        }
        let Some(expire_at) = self.held.get(name).map(|held| held.expire_at) else {
            return Ok(false);
        };

        let new_expire_at = expire_at.saturating_add(additional_secs);
        let remaining = new_expire_at - self.clock.unix_seconds();
        if remaining <= 0 {
            return Err(KxError::LockExpired(name.to_string()));
        }

        self.store.expire(&lock_key(name), remaining).await?;
        if let Some(held) = self.held.get_mut(name) {
            held.expire_at = new_expire_at;
        }
        tracing::debug!(lock = name, expire_at = new_expire_at, "Lock renewed");
        Ok(true)
    }

    /// Whether this handle holds `name` and the store's record still carries
    /// the value this handle wrote.
    ///
    /// Catches a record deleted and recreated with a different lifetime, but
    /// not one recreated with the same lifetime.
    pub async fn is_held(&self, name: &str) -> Result<bool> {
        let Some(held) = self.held.get(name) else {
            return Ok(false);
        };
        let current = self.store.get(&lock_key(name)).await?;
        Ok(current.as_deref() == Some(held.token.as_str()))
    }

    /// Names this handle believes it holds, in no particular order.
    pub fn held_names(&self) -> Vec<String> {
        self.held.keys().cloned().collect()
    }

    /// Locally recorded expiry instant (epoch seconds) of a held lock.
    pub fn expire_at(&self, name: &str) -> Option<i64> {
        self.held.get(name).map(|held| held.expire_at)
    }

    async fn arm_expiry(&self, key: &str, expire_secs: i64) -> Result<()> {
        // A non-positive EXPIRE would delete the record outright.
        if expire_secs > 0 {
            self.store.expire(key, expire_secs).await?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KxError::invalid("lock name must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_common::ManualClock;
    use kx_storage::MemoryStore;

    fn manager() -> (LockManager, MemoryStore) {
        let clock = Arc::new(ManualClock::at_unix_seconds(1_700_000_000));
        let store = MemoryStore::with_clock(clock.clone());
        (LockManager::with_clock(Arc::new(store.clone()), clock), store)
    }

    #[test]
    fn test_lock_key_prefix() {
        assert_eq!(lock_key("jobs"), "kx:jobs");
        assert_eq!(lock_key("Queue:jobs"), "kx:Queue:jobs");
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected_without_store_call() {
        let (mut locks, store) = manager();
        store.inject_failure("set_nx").await;

        let err = locks.acquire("", 5, 10, 1000).await.unwrap_err();
        assert!(matches!(err, KxError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_acquire_records_expiry_and_token() {
        let (mut locks, store) = manager();

        assert!(locks.acquire("a", 0, 10, 1000).await.unwrap());

        assert_eq!(locks.expire_at("a"), Some(1_700_000_010));
        assert_eq!(store.get("kx:a").await.unwrap().as_deref(), Some("10"));
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Expires(10));
        assert_eq!(locks.held_names(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_store_error_aborts_acquire() {
        let (mut locks, store) = manager();
        store.inject_failure("set_nx").await;

        let err = locks.acquire("a", 5, 10, 1000).await.unwrap_err();
        assert!(err.is_store());
        assert!(locks.held_names().is_empty());
    }

    #[tokio::test]
    async fn test_failed_arm_leaves_recoverable_record() {
        let (mut locks, store) = manager();
        store.inject_failure("expire").await;

        assert!(locks.acquire("a", 0, 10, 1000).await.unwrap_err().is_store());
        assert!(locks.expire_at("a").is_none());
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Persistent);
    }

    #[tokio::test]
    async fn test_zero_expiry_leaves_record_unarmed() {
        let (mut locks, store) = manager();

        assert!(locks.acquire("a", 0, 0, 1000).await.unwrap());
        assert_eq!(store.ttl("kx:a").await.unwrap(), Ttl::Persistent);
    }

    #[tokio::test]
    async fn test_release_keeps_entry_when_delete_fails() {
        let (mut locks, store) = manager();
        assert!(locks.acquire("a", 0, 10, 1000).await.unwrap());

        store.inject_failure("delete").await;
        assert!(locks.release("a").await.unwrap_err().is_store());
        assert!(locks.expire_at("a").is_some());

        store.clear_failures().await;
        assert!(locks.release("a").await.unwrap());
        assert!(locks.expire_at("a").is_none());
    }

    #[tokio::test]
    async fn test_release_all_attempts_every_lock() {
        let (mut locks, store) = manager();
        for name in ["a", "b", "c"] {
            assert!(locks.acquire(name, 0, 10, 1000).await.unwrap());
        }

        store.inject_failure("delete").await;
        assert!(!locks.release_all().await);
        assert_eq!(locks.held_names().len(), 3);

        store.clear_failures().await;
        assert!(locks.release_all().await);
        assert!(locks.held_names().is_empty());
        assert!(!store.contains_key("kx:a").await);
        assert!(!store.contains_key("kx:b").await);
        assert!(!store.contains_key("kx:c").await);
    }

    #[tokio::test]
    async fn test_release_all_with_nothing_held_is_true() {
        let (mut locks, _) = manager();
        assert!(locks.release_all().await);
    }
}
