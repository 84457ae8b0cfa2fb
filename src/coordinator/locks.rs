// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-group async locks.
//!
//! Calls for the same group run one at a time; calls for different groups
//! never wait on each other. An entry lives only while someone holds or
//! waits for it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `group_id`.
    pub async fn acquire(&self, group_id: &str) -> GroupGuard<'_> {
        let lock = self
            .locks
            .entry(group_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = lock.lock_owned().await;
        GroupGuard {
            registry: self,
            group_id: group_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Groups currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one group until dropped.
pub struct GroupGuard<'a> {
    registry: &'a GroupLocks,
    group_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl GroupGuard<'_> {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the registry's own reference left: nobody holds or waits
        self.registry
            .locks
            .remove_if(&self.group_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
