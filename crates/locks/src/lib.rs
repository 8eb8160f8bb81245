//! # kx locks
//!
//! Client-side mutual exclusion and a priority work queue coordinated
//! through a shared [`kx_storage::Store`].
//!
//! - [`LockManager`]: named, self-expiring locks. Each handle keeps its own
//!   table of the locks it believes it holds; the store stays the source of
//!   truth.
//! - [`PriorityQueue`]: a sorted set of task ids per queue, every mutation
//!   serialized by the lock `Queue:<name>`.
//!
//! ## Example
//! ```rust,no_run
//! use kx_common::QueueConfig;
//! use kx_locks::{LockManager, PriorityQueue};
//! use kx_storage::RedisStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> kx_common::Result<()> {
//! let store = Arc::new(RedisStore::new("redis://127.0.0.1/").await?);
//!
//! let mut locks = LockManager::new(store.clone());
//! if locks.acquire("reports:nightly", 5, 30, 100_000).await? {
//!     // ... exclusive work ...
//!     locks.release("reports:nightly").await?;
//! }
//!
//! let mut queue = PriorityQueue::new(LockManager::new(store), QueueConfig::default());
//! queue.enqueue("jobs", &[42], 5, 0).await?;
//! for entry in queue.pop_batch("jobs", 10, 5).await? {
//!     // ... process entry.id ...
//!     queue.dequeue("jobs", entry.id, entry.score, 5).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod queue;

pub use manager::{lock_key, HeldLock, LockManager, LOCK_KEY_PREFIX};
pub use queue::{queue_key, PriorityQueue, QueueEntry, QUEUE_KEY_PREFIX};
