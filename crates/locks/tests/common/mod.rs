//! Shared fixtures: one in-memory store and one manual clock that every
//! handle in a test shares, like several clients of one Redis server.

#![allow(dead_code)]

use kx_common::{ManualClock, QueueConfig};
use kx_locks::{LockManager, PriorityQueue};
use kx_storage::MemoryStore;
use std::sync::Arc;

pub const T0: i64 = 1_700_000_000;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::at_unix_seconds(T0));
        let store = MemoryStore::with_clock(clock.clone());
        Self { clock, store }
    }

    /// A fresh client handle against the shared store.
    pub fn handle(&self) -> LockManager {
        LockManager::with_clock(Arc::new(self.store.clone()), self.clock.clone())
    }

    pub fn queue(&self) -> PriorityQueue {
        PriorityQueue::new(self.handle(), QueueConfig::default())
    }

    pub fn now_millis(&self) -> i64 {
        use kx_common::Clock;
        self.clock.now().timestamp_millis()
    }
}
