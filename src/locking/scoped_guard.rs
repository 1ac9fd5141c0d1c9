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

use crate::error::Result;
use crate::locking::active::{self, ActiveLock};
use crate::locking::wait_observer::LockWaitObserver;
use log::{debug, warn};

/// RAII guard that releases a registered lock when dropped.
///
/// The guard keeps only the node id; the registry entry carries the backend.
/// If the exit hook already drained the entry, release is a no-op.
pub struct ActiveLockGuard<'a> {
    node_id: String,
    lock_name: String,
    observer: Option<&'a dyn LockWaitObserver>,
    released: bool,
}

impl<'a> ActiveLockGuard<'a> {
    pub fn register(lock: ActiveLock, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        let node_id = lock.node_id().to_string();
        let lock_name = lock.lock_name().to_string();
        active::register(lock);
        Self {
            node_id,
            lock_name,
            observer,
            released: false,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Some(lock) = active::take(&self.node_id) else {
            debug!(
                "[{}] Lock {} was already released by shutdown cleanup",
                self.node_id, self.lock_name
            );
            return Ok(());
        };

        let held = lock.held_for();
        lock.release()?;
        debug!(
            "[{}] Released lock {} after {:.3}s",
            self.node_id,
            self.lock_name,
            held.as_secs_f64()
        );
        if let Some(observer) = self.observer {
            observer.on_released(&self.lock_name, held);
        }
        Ok(())
    }
}

impl Drop for ActiveLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            warn!(
                "[{}] Failed to release lock {}: {err}",
                self.node_id, self.lock_name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use crate::test::fixtures::MockBackend;
    use std::sync::Arc;

    fn releasing_backend(node_id: &'static str, result: fn() -> Result<()>) -> MockBackend {
        let mut backend = MockBackend::new();
        backend
            .expect_release_lock()
            .withf(move |lock_name, id| lock_name == "jobs" && id == node_id)
            .times(1)
            .returning(move |_, _| result());
        backend
    }

    #[test]
    fn drop_releases_and_deregisters() {
        let backend = releasing_backend("guard-drop-node", || Ok(()));
        {
            let guard = ActiveLockGuard::register(
                ActiveLock::new("jobs", "guard-drop-node", Arc::new(backend)),
                None,
            );
            assert_eq!(guard.lock_name(), "jobs");
            assert!(active::is_active("guard-drop-node"));
        }
        assert!(!active::is_active("guard-drop-node"));
    }

    #[test]
    fn explicit_release_reports_failure_once() {
        let backend = releasing_backend("guard-fail-node", || {
            Err(LockError::database(std::io::Error::other("connection lost")))
        });
        let guard = ActiveLockGuard::register(
            ActiveLock::new("jobs", "guard-fail-node", Arc::new(backend)),
            None,
        );

        assert!(matches!(guard.release(), Err(LockError::Database(_))));
        assert!(!active::is_active("guard-fail-node"));
    }

    #[test]
    fn release_after_external_cleanup_is_noop() {
        let mut backend = MockBackend::new();
        backend.expect_release_lock().never();
        let guard = ActiveLockGuard::register(
            ActiveLock::new("jobs", "guard-drained-node", Arc::new(backend)),
            None,
        );

        let taken = active::take("guard-drained-node");
        assert!(taken.is_some());

        guard.release().unwrap();
    }
}
