use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-schedule execution locks.
///
/// Holding a schedule's guard serializes everything that reads-then-writes that
/// schedule: ticks, execute-now and lifecycle edits.
pub struct ScheduleLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl ScheduleLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Wait up to the configured timeout; `None` if the lock stayed busy
    pub async fn acquire(&self, schedule_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        let lock = self.locks.entry(schedule_id).or_default().value().clone();
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .ok()
    }

    /// Drop the registry entry for a deleted schedule
    pub fn forget(&self, schedule_id: Uuid) {
        self.locks.remove(&schedule_id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
