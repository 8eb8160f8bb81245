use async_trait::async_trait;
use kx_common::Result;

/// Remaining lifetime of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key does not exist.
    Missing,
    /// The key exists but has no expiry configured.
    Persistent,
    /// The key expires in this many seconds.
    Expires(i64),
}

impl Ttl {
    /// Decode the integer reply of a Redis `TTL` command.
    pub fn from_redis_reply(reply: i64) -> Self {
        match reply {
            -2 => Ttl::Missing,
            -1 => Ttl::Persistent,
            secs => Ttl::Expires(secs.max(0)),
        }
    }
}

/// Atomic key-value and sorted-set primitives of the shared store.
///
/// Each call is one round-trip; nothing here composes calls atomically.
/// Locking is layered on top of these in `kx-locks`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create `key` only if absent. Returns whether it was created.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool>;

    /// Set (or overwrite) the expiry of `key`, in seconds from now.
    async fn expire(&self, key: &str, seconds: i64) -> Result<()>;

    async fn ttl(&self, key: &str) -> Result<Ttl>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional delete. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Score of `member` in the sorted set, `None` if absent.
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>>;

    /// Insert or update `member` with `score`.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()>;

    async fn zrem(&self, key: &str, member: &str) -> Result<()>;

    /// Members between ranks `start` and `stop` inclusive, lowest score first.
    /// Negative ranks count from the end as in Redis.
    async fn zrange_withscores(&self, key: &str, start: isize, stop: isize) -> Result<Vec<(String, i64)>>;

    async fn ping(&self) -> Result<()>;
}
