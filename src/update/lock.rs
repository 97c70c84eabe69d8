// src/update/lock.rs

//! Per-repository serialisation
//!
//! Updates of one repository queue behind each other; distinct repositories
//! never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct RepoLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl RepoLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `repo_id`
    pub(crate) async fn acquire(&self, repo_id: i64) -> OwnedMutexGuard<()> {
        // Clone out of the map so no shard lock is held across the await
        let lock = self.locks.entry(repo_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Whether an update of `repo_id` is in flight
    pub(crate) fn is_busy(&self, repo_id: i64) -> bool {
        self.locks
            .get(&repo_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
