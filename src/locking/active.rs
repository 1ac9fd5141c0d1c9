// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide registry of locks currently held by this process.
//!
//! Entries are keyed by node id. Whoever removes an entry owns its release,
//! so a lock is never released twice by the owning guard and the exit hook.

use crate::error::{LockError, Result};
use crate::mutex::MutexBackend;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// A lock this process owns in the database.
pub struct ActiveLock {
    lock_name: String,
    node_id: String,
    backend: Arc<dyn MutexBackend>,
    acquired_at: Instant,
}

impl ActiveLock {
    pub fn new(
        lock_name: impl Into<String>,
        node_id: impl Into<String>,
        backend: Arc<dyn MutexBackend>,
    ) -> Self {
        Self {
            lock_name: lock_name.into(),
            node_id: node_id.into(),
            backend,
            acquired_at: Instant::now(),
        }
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn release(self) -> Result<()> {
        self.backend.release_lock(&self.lock_name, &self.node_id)
    }
}

/// Outcome of [`release_active_locks`].
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub released: Vec<String>,
    pub failures: Vec<(String, LockError)>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

static ACTIVE_LOCKS: OnceLock<Mutex<HashMap<String, ActiveLock>>> = OnceLock::new();

fn active_locks() -> &'static Mutex<HashMap<String, ActiveLock>> {
    ACTIVE_LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn register(lock: ActiveLock) {
    let mut locks = active_locks().lock().unwrap_or_else(PoisonError::into_inner);
    locks.insert(lock.node_id.clone(), lock);
}

/// Removes the entry for `node_id`, transferring release to the caller.
pub(crate) fn take(node_id: &str) -> Option<ActiveLock> {
    active_locks()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(node_id)
}

pub fn is_active(node_id: &str) -> bool {
    active_locks()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(node_id)
}

pub fn active_lock_count() -> usize {
    active_locks()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

/// Releases every lock still registered, logging failures.
///
/// Used by the exit hook; also available to callers with their own shutdown
/// path.
pub fn release_active_locks() -> ReleaseReport {
    let drained: Vec<ActiveLock> = {
        let mut locks = active_locks().lock().unwrap_or_else(PoisonError::into_inner);
        locks.drain().map(|(_, lock)| lock).collect()
    };

    let mut report = ReleaseReport::default();
    for lock in drained {
        let lock_name = lock.lock_name.clone();
        let node_id = lock.node_id.clone();
        match lock.release() {
            Ok(()) => {
                info!("[{node_id}] Released lock {lock_name} during shutdown");
                report.released.push(lock_name);
            }
            Err(err) => {
                warn!("[{node_id}] Failed to release lock {lock_name} during shutdown: {err}");
                report.failures.push((lock_name, err));
            }
        }
    }
    report
}
