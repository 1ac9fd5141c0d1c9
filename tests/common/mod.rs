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

#[allow(dead_code)]
pub mod memory_db;

pub use memory_db::MemoryDatabase;

use dlock::{DistributedLock, DistributedLockBuilder};
use std::sync::Arc;

/// Builder for a lock on `db`, found through query interface auto-detection.
#[allow(dead_code)]
pub fn memory_lock(db: &Arc<MemoryDatabase>, lock_name: &str) -> DistributedLockBuilder {
    memory_db::install();
    DistributedLock::builder(lock_name)
        .client(db.clone())
        .install_exit_hook(false)
}
