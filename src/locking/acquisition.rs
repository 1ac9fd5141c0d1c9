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

use crate::error::LockError;
use crate::locking::wait_observer::{Contention, LockWaitObserver};
use std::time::{Duration, Instant};

/// Tracks elapsed and remaining time for a lock timeout budget.
#[derive(Debug, Clone)]
pub struct LockTimeoutBudget {
    timeout: Duration,
    started_at: Instant,
}

impl LockTimeoutBudget {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            started_at: Instant::now(),
        }
    }

    pub fn with_start(timeout: Duration, started_at: Instant) -> Self {
        Self {
            timeout,
            started_at,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

/// State of one acquisition flow: budget, attempt count and observer.
pub struct LockAcquisitionRequest<'a> {
    lock_name: &'a str,
    budget: LockTimeoutBudget,
    sleep_interval: Duration,
    observer: Option<&'a dyn LockWaitObserver>,
    attempts: usize,
}

impl<'a> LockAcquisitionRequest<'a> {
    pub fn new(lock_name: &'a str, timeout: Duration, sleep_interval: Duration) -> Self {
        Self {
            lock_name,
            budget: LockTimeoutBudget::new(timeout),
            sleep_interval,
            observer: None,
            attempts: 0,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn lock_name(&self) -> &str {
        self.lock_name
    }

    pub fn budget(&self) -> &LockTimeoutBudget {
        &self.budget
    }

    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.budget.is_expired()
    }

    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        if let Some(observer) = self.observer {
            observer.on_attempt(self.lock_name, self.attempts);
        }
    }

    pub fn record_contention(&self, contention: &Contention) {
        if let Some(observer) = self.observer {
            observer.on_contended(
                self.lock_name,
                contention,
                self.elapsed(),
                self.budget.remaining(),
            );
        }
    }

    pub fn notify_acquired(&self) {
        if let Some(observer) = self.observer {
            observer.on_acquired(self.lock_name, self.elapsed());
        }
    }

    pub fn notify_skipped(&self, owner: &str) {
        if let Some(observer) = self.observer {
            observer.on_skipped(self.lock_name, owner);
        }
    }

    /// Reports the expiry and returns the error the caller should surface.
    pub fn timeout_error(&self) -> LockError {
        if let Some(observer) = self.observer {
            observer.on_timeout(self.lock_name, self.elapsed());
        }
        LockError::LockTimeout {
            lock_name: self.lock_name.to_string(),
            timeout: self.budget.timeout(),
        }
    }
}
