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

use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::locking::acquisition::LockAcquisitionRequest;
use crate::locking::active::ActiveLock;
use crate::locking::exit_hook;
use crate::locking::scoped_guard::ActiveLockGuard;
use crate::locking::wait_observer::{Contention, LockWaitObserver};
use crate::mutex::{Mutex, MutexBackend};
use crate::query_interface::{ClientHandle, QueryInterface, get_query_interface};
use log::{debug, warn};
use std::any::Any;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Timing of one `lock` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Upper bound on waiting; checked after each sleep.
    pub timeout: Duration,
    pub sleep_interval: Duration,
}

impl LockOptions {
    pub fn new(timeout: Duration, sleep_interval: Duration) -> Self {
        Self {
            timeout,
            sleep_interval,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sleep_interval(mut self, sleep_interval: Duration) -> Self {
        self.sleep_interval = sleep_interval;
        self
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self::new(config.timeout(), config.sleep_interval())
    }
}

/// Outcome of [`DistributedLock::lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Execution<T> {
    /// The lock was obtained and the logic returned this value.
    Completed(T),
    /// Another node held the lock and `skip_if_obtained` was set.
    Skipped,
}

impl<T> Execution<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Execution::Completed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Execution::Skipped)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Execution::Completed(value) => Some(value),
            Execution::Skipped => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Execution<U> {
        match self {
            Execution::Completed(value) => Execution::Completed(f(value)),
            Execution::Skipped => Execution::Skipped,
        }
    }
}

/// Named lock shared by every process using the same lock table.
///
/// Each instance has its own random node id. The lock row is claimed in the
/// database before the logic runs and removed afterwards, even when the logic
/// fails or panics.
pub struct DistributedLock {
    node_id: String,
    lock_name: String,
    skip_if_obtained: bool,
    backend: Arc<dyn MutexBackend>,
    observer: Option<Arc<dyn LockWaitObserver>>,
    install_exit_hook: bool,
}

impl DistributedLock {
    pub fn builder(lock_name: impl Into<String>) -> DistributedLockBuilder {
        DistributedLockBuilder::new(lock_name)
    }

    /// Creates a lock over any backend, with the exit hook enabled.
    pub fn with_backend(
        lock_name: impl Into<String>,
        backend: Arc<dyn MutexBackend>,
        skip_if_obtained: bool,
    ) -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            lock_name: lock_name.into(),
            skip_if_obtained,
            backend,
            observer: None,
            install_exit_hook: true,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LockWaitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_exit_hook(mut self, install_exit_hook: bool) -> Self {
        self.install_exit_hook = install_exit_hook;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    pub fn skip_if_obtained(&self) -> bool {
        self.skip_if_obtained
    }

    /// Runs `execute` while holding the lock.
    ///
    /// Contention (`AlreadyObtained`, `TableLocked`) is retried every
    /// `sleep_interval` until `timeout` has elapsed, which yields
    /// [`LockError::LockTimeout`] without running the logic. With
    /// `skip_if_obtained`, a lock held by another node returns
    /// [`Execution::Skipped`] at once. Any other error stops the attempt.
    pub fn lock<T, E, F>(
        &mut self,
        execute: F,
        options: LockOptions,
    ) -> std::result::Result<Execution<T>, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<LockError>,
    {
        if self.install_exit_hook {
            exit_hook::install();
        }

        self.backend.initialize_lock_table()?;

        let observer = self.observer.as_deref();
        let mut request =
            LockAcquisitionRequest::new(&self.lock_name, options.timeout, options.sleep_interval)
                .with_observer(observer);

        loop {
            request.record_attempt();
            let contention = match self.backend.obtain_lock(&self.lock_name, &self.node_id) {
                Ok(()) => break,
                Err(LockError::AlreadyObtained { owner, .. }) if self.skip_if_obtained => {
                    debug!(
                        "[{}] Lock {} is held by {owner}, skipping",
                        self.node_id, self.lock_name
                    );
                    request.notify_skipped(&owner);
                    return Ok(Execution::Skipped);
                }
                Err(LockError::AlreadyObtained { owner, .. }) => Contention::Held { owner },
                Err(LockError::TableLocked { .. }) => Contention::TableLocked,
                Err(err) => return Err(err.into()),
            };

            debug!(
                "[{}] Lock {} not obtained ({contention}), retrying in {:?}",
                self.node_id,
                self.lock_name,
                request.sleep_interval()
            );
            request.record_contention(&contention);
            thread::sleep(request.sleep_interval());

            if request.is_expired() {
                debug!(
                    "[{}] Gave up on lock {} after {} attempt(s)",
                    self.node_id,
                    self.lock_name,
                    request.attempts()
                );
                return Err(request.timeout_error().into());
            }
        }

        debug!(
            "[{}] Obtained lock {} after {} attempt(s)",
            self.node_id,
            self.lock_name,
            request.attempts()
        );
        request.notify_acquired();

        let guard = ActiveLockGuard::register(
            ActiveLock::new(&self.lock_name, &self.node_id, self.backend.clone()),
            observer,
        );
        let outcome = execute();
        if let Err(err) = guard.release() {
            warn!(
                "[{}] Failed to release lock {}: {err}",
                self.node_id, self.lock_name
            );
        }

        outcome.map(Execution::Completed)
    }

    /// [`lock`](Self::lock) with [`LockOptions::default`].
    pub fn lock_with_defaults<T, E, F>(&mut self, execute: F) -> std::result::Result<Execution<T>, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<LockError>,
    {
        self.lock(execute, LockOptions::default())
    }
}

/// Builder for [`DistributedLock`].
///
/// Settings given directly win over the [`LockConfig`], which in turn falls
/// back to its defaults.
pub struct DistributedLockBuilder {
    lock_name: String,
    lock_table_name: Option<String>,
    lock_ttl: Option<Duration>,
    skip_if_obtained: Option<bool>,
    client: Option<ClientHandle>,
    query_interface: Option<Arc<dyn QueryInterface>>,
    query_interface_name: Option<String>,
    backend: Option<Arc<dyn MutexBackend>>,
    config: Option<LockConfig>,
    observer: Option<Arc<dyn LockWaitObserver>>,
    install_exit_hook: Option<bool>,
}

impl DistributedLockBuilder {
    pub fn new(lock_name: impl Into<String>) -> Self {
        Self {
            lock_name: lock_name.into(),
            lock_table_name: None,
            lock_ttl: None,
            skip_if_obtained: None,
            client: None,
            query_interface: None,
            query_interface_name: None,
            backend: None,
            config: None,
            observer: None,
            install_exit_hook: None,
        }
    }

    /// Database client resolved through the query interface registry.
    pub fn client<C: Any + Send>(mut self, client: C) -> Self {
        self.client = Some(Box::new(client));
        self
    }

    pub fn client_handle(mut self, client: ClientHandle) -> Self {
        self.client = Some(client);
        self
    }

    pub fn query_interface(mut self, query_interface: Arc<dyn QueryInterface>) -> Self {
        self.query_interface = Some(query_interface);
        self
    }

    /// Adapter to use for the client instead of auto-detection.
    pub fn query_interface_name(mut self, name: impl Into<String>) -> Self {
        self.query_interface_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn MutexBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn lock_table_name(mut self, lock_table_name: impl Into<String>) -> Self {
        self.lock_table_name = Some(lock_table_name.into());
        self
    }

    pub fn lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = Some(lock_ttl);
        self
    }

    pub fn skip_if_obtained(mut self, skip_if_obtained: bool) -> Self {
        self.skip_if_obtained = Some(skip_if_obtained);
        self
    }

    pub fn config(mut self, config: LockConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn LockWaitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn install_exit_hook(mut self, install_exit_hook: bool) -> Self {
        self.install_exit_hook = Some(install_exit_hook);
        self
    }

    pub fn build(self) -> Result<DistributedLock> {
        if self.lock_name.is_empty() {
            return Err(LockError::InvalidConfig(
                "lock name must not be empty".to_string(),
            ));
        }

        let config = self.config.unwrap_or_default();
        config.validate()?;

        let backend = match (self.backend, self.query_interface, self.client) {
            (Some(backend), _, _) => backend,
            (None, query_interface, client) => {
                let query_interface = match (query_interface, client) {
                    (Some(query_interface), _) => query_interface,
                    (None, Some(client)) => {
                        let name = self
                            .query_interface_name
                            .or_else(|| config.query_interface_name.clone());
                        get_query_interface(client, name.as_deref())?
                    }
                    (None, None) => return Err(LockError::MissingQueryInterface),
                };

                let lock_table_name = self
                    .lock_table_name
                    .unwrap_or_else(|| config.lock_table_name.clone());
                let lock_ttl = self.lock_ttl.unwrap_or_else(|| config.lock_ttl());
                Arc::new(Mutex::new(query_interface, lock_table_name, lock_ttl)?)
                    as Arc<dyn MutexBackend>
            }
        };

        let mut lock = DistributedLock::with_backend(
            self.lock_name,
            backend,
            self.skip_if_obtained.unwrap_or(config.skip_if_obtained),
        )
        .with_exit_hook(self.install_exit_hook.unwrap_or(config.install_exit_hook));
        lock.observer = self.observer;

        debug!(
            "[{}] Created distributed lock {}",
            lock.node_id, lock.lock_name
        );
        Ok(lock)
    }
}
