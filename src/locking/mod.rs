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

pub mod acquisition;
pub mod active;
pub mod distributed_lock;
pub mod exit_hook;
pub mod scoped_guard;
pub mod wait_observer;

pub use acquisition::{LockAcquisitionRequest, LockTimeoutBudget};
pub use active::{ActiveLock, ReleaseReport, active_lock_count, is_active, release_active_locks};
pub use distributed_lock::{DistributedLock, DistributedLockBuilder, Execution, LockOptions};
pub use exit_hook::ExitHookStatus;
pub use scoped_guard::ActiveLockGuard;
pub use wait_observer::{Contention, LockWaitObserver, NoopLockWaitObserver};
