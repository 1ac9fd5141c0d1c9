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

//! Observer interfaces for lock wait instrumentation.
//!
//! Lock wait observers decouple `DistributedLock` from callers that want to
//! surface contention, such as progress output or metrics, without wrapping
//! the acquisition loop.

use std::fmt;
use std::time::Duration;

/// Why an acquisition attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contention {
    /// Another node holds the lock row.
    Held { owner: String },
    /// Another transaction holds the lock table.
    TableLocked,
}

impl fmt::Display for Contention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contention::Held { owner } => write!(f, "held by {owner}"),
            Contention::TableLocked => f.write_str("lock table busy"),
        }
    }
}

/// Observer hooks for lock wait events.
pub trait LockWaitObserver: Send + Sync {
    fn on_attempt(&self, _lock_name: &str, _attempt: usize) {}

    fn on_contended(
        &self,
        _lock_name: &str,
        _contention: &Contention,
        _elapsed: Duration,
        _remaining: Duration,
    ) {
    }

    fn on_acquired(&self, _lock_name: &str, _waited: Duration) {}

    fn on_skipped(&self, _lock_name: &str, _owner: &str) {}

    fn on_timeout(&self, _lock_name: &str, _waited: Duration) {}

    fn on_released(&self, _lock_name: &str, _held: Duration) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockWaitObserver;

impl LockWaitObserver for NoopLockWaitObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_display() {
        let held = Contention::Held {
            owner: "node-2".to_string(),
        };
        assert_eq!(held.to_string(), "held by node-2");
        assert_eq!(Contention::TableLocked.to_string(), "lock table busy");
    }

    #[test]
    fn noop_observer_accepts_every_event() {
        let observer = NoopLockWaitObserver;
        observer.on_attempt("jobs", 1);
        observer.on_contended(
            "jobs",
            &Contention::TableLocked,
            Duration::ZERO,
            Duration::from_secs(1),
        );
        observer.on_acquired("jobs", Duration::ZERO);
        observer.on_skipped("jobs", "node-2");
        observer.on_timeout("jobs", Duration::ZERO);
        observer.on_released("jobs", Duration::ZERO);
    }
}
