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

//! Distributed mutual exclusion coordinated through a relational database.
//!
//! Processes that share a database serialize a named critical section through
//! a lock table. [`DistributedLock`] runs the acquisition loop, [`Mutex`]
//! turns table locks and an owner-preserving upsert into transactional
//! primitives, [`LockInterface`] renders dialect SQL and [`QueryInterface`]
//! adapts the client library.

pub mod config;
pub mod error;
pub mod lock_interface;
pub mod locking;
pub mod logging;
pub mod mutex;
pub mod query_interface;
#[cfg(test)]
pub mod test;

pub use crate::config::LockConfig;
pub use error::{LockError, Result};
pub use lock_interface::{LockInterface, get_lock_interface, register_dialect};
pub use locking::{DistributedLock, DistributedLockBuilder, Execution, LockOptions};
pub use locking::{LockWaitObserver, release_active_locks};
pub use mutex::{Mutex, MutexBackend};
pub use query_interface::{
    DatabaseErrorKind, DbTransaction, QueryInterface, get_query_interface,
    register_query_interface,
};
