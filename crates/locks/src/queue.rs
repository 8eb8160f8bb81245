//! Priority work queue stored as a sorted set, serialized by [`LockManager`].
//!
//! Members are task ids and scores are epoch seconds, so the lowest score is
//! the task that became eligible first. Every operation holds the lock
//! `Queue:<name>` while it touches the set.
//!
//! Consumption is fetch/ack: [`PriorityQueue::pop_batch`] reads the head of
//! the queue without removing it, and a consumer acknowledges a task with
//! [`PriorityQueue::dequeue`] using the score it read. A score that no longer
//! matches means the task was re-enqueued in the meantime.

use kx_common::{Clock, KxError, QueueConfig, Result};
use kx_storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::manager::LockManager;

pub const QUEUE_KEY_PREFIX: &str = "Queue:";

/// Store key of the sorted set for queue `name`. Also the queue's lock name.
pub fn queue_key(name: &str) -> String {
    format!("{}{}", QUEUE_KEY_PREFIX, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub score: i64,
}

pub struct PriorityQueue {
    locks: LockManager,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

impl PriorityQueue {
    /// Build a queue that shares the store and clock of `locks`.
    pub fn new(locks: LockManager, config: QueueConfig) -> Self {
        let store = locks.store().clone();
        let clock = locks.clock().clone();
        Self {
            locks,
            store,
            clock,
            config,
        }
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Add `ids` with score `now + delay_secs`.
    ///
    /// Ids already queued with a nonzero score keep their existing score.
    /// Returns how many ids were added.
    pub async fn enqueue(&mut self, name: &str, ids: &[i64], timeout_secs: i64, delay_secs: i64) -> Result<usize> {
        validate_queue_name(name)?;
        if ids.is_empty() {
            return Err(KxError::invalid("ids must not be empty"));
        }
        if timeout_secs <= 0 {
            return Err(KxError::invalid(format!("timeout must be > 0, got {}", timeout_secs)));
        }

        let key = queue_key(name);
        self.lock_queue(&key, timeout_secs).await?;
        let result = self.enqueue_locked(&key, ids, delay_secs).await;
        self.unlock_queue(&key).await;
        result
    }

    /// Remove `id` if its score still equals `expected_score`.
    ///
    /// `Ok(false)` when the id is gone or its score changed.
    pub async fn dequeue(&mut self, name: &str, id: i64, expected_score: i64, timeout_secs: i64) -> Result<bool> {
        validate_queue_name(name)?;
        if id == 0 {
            return Err(KxError::invalid("task id must not be 0"));
        }
        if expected_score <= 0 {
            return Err(KxError::invalid(format!("score must be > 0, got {}", expected_score)));
        }

        let key = queue_key(name);
        self.lock_queue(&key, timeout_secs).await?;
        let result = self.dequeue_locked(&key, id, expected_score).await;
        self.unlock_queue(&key).await;
        result
    }

    /// Read up to `count` earliest entries, lowest score first. Nothing is removed.
    pub async fn pop_batch(&mut self, name: &str, count: usize, timeout_secs: i64) -> Result<Vec<QueueEntry>> {
        validate_queue_name(name)?;
        if count == 0 {
            return Err(KxError::invalid("count must be > 0"));
        }

        let key = queue_key(name);
        self.lock_queue(&key, timeout_secs).await?;
        let result = self.pop_batch_locked(&key, count).await;
        self.unlock_queue(&key).await;
        result
    }

    async fn enqueue_locked(&self, key: &str, ids: &[i64], delay_secs: i64) -> Result<usize> {
        let score = self.clock.unix_seconds().saturating_add(delay_secs);
        let mut added = 0;

        for id in ids {
            let member = id.to_string();
            match self.store.zscore(key, &member).await? {
                Some(existing) if existing != 0 => {
                    tracing::debug!(queue = key, id, existing, "Task already queued, keeping its score");
                }
                _ => {
                    self.store.zadd(key, &member, score).await?;
                    added += 1;
                }
            }
        }

        tracing::debug!(queue = key, added, score, "Enqueued tasks");
        Ok(added)
    }

    async fn dequeue_locked(&self, key: &str, id: i64, expected_score: i64) -> Result<bool> {
        let member = id.to_string();
        match self.store.zscore(key, &member).await? {
            Some(score) if score == expected_score => {
                self.store.zrem(key, &member).await?;
                tracing::debug!(queue = key, id, score, "Dequeued task");
                Ok(true)
            }
            current => {
                tracing::debug!(queue = key, id, expected_score, ?current, "Stale dequeue ignored");
                Ok(false)
            }
        }
    }

    async fn pop_batch_locked(&self, key: &str, count: usize) -> Result<Vec<QueueEntry>> {
        let stop = isize::try_from(count - 1).unwrap_or(isize::MAX);
        let members = self.store.zrange_withscores(key, 0, stop).await?;

        let mut entries = Vec::with_capacity(members.len());
        for (member, score) in members {
            match member.parse::<i64>() {
                Ok(id) => entries.push(QueueEntry { id, score }),
                Err(_) => tracing::warn!(queue = key, member = %member, "Skipping non-numeric queue member"),
            }
        }
        Ok(entries)
    }

    async fn lock_queue(&mut self, key: &str, timeout_secs: i64) -> Result<()> {
        let acquired = self
            .locks
            .acquire(
                key,
                timeout_secs,
                self.config.lock_lifetime_secs,
                self.config.poll_interval_micros,
            )
            .await?;
        if !acquired {
            return Err(KxError::LockUnavailable(key.to_string()));
        }
        Ok(())
    }

    async fn unlock_queue(&mut self, key: &str) {
        if let Err(e) = self.locks.release(key).await {
            tracing::warn!(queue = key, "Failed to release queue lock: {}", e);
        }
    }
}

fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KxError::invalid("queue name must not be empty"));
    }
    Ok(())
}
