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

//! SQL dialect adapters for the lock table.
//!
//! A [`LockInterface`] only produces statement text; execution belongs to the
//! query interface. Dialects are looked up by the name the query interface
//! reports, through a process-wide registry seeded with `postgres`.

pub mod postgres;

pub use postgres::PostgresLock;

use crate::error::{LockError, Result};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

/// Statement generator for one SQL dialect.
///
/// `obtain_mutex` and `remove_mutex` use the `:mutex` and `:node_id`
/// placeholders. `obtain_mutex` must return the owner column of the row it
/// leaves behind.
pub trait LockInterface: Send + Sync {
    fn dialect(&self) -> &str;

    fn create_schema(&self, _schema: &str) -> Result<String> {
        Err(LockError::NotImplemented("create_schema"))
    }

    fn create_lock_table(&self, table: &str) -> String;

    fn remove_stale_locks(&self, table: &str, ttl: Duration) -> String;

    fn lock_table(&self, table: &str, wait: bool) -> String;

    fn obtain_mutex(&self, table: &str) -> String;

    fn remove_mutex(&self, table: &str) -> String;

    fn owner_column(&self) -> &str {
        "node_id"
    }
}

pub type LockInterfaceConstructor = fn() -> Arc<dyn LockInterface>;

static DIALECTS: OnceLock<RwLock<Vec<(String, LockInterfaceConstructor)>>> = OnceLock::new();

fn dialects() -> &'static RwLock<Vec<(String, LockInterfaceConstructor)>> {
    DIALECTS.get_or_init(|| {
        RwLock::new(vec![(
            PostgresLock::DIALECT.to_string(),
            PostgresLock::construct as LockInterfaceConstructor,
        )])
    })
}

/// Registers a dialect, replacing an existing entry with the same name.
pub fn register_dialect(dialect: impl Into<String>, constructor: LockInterfaceConstructor) {
    let dialect = dialect.into();
    let mut entries = dialects().write().unwrap_or_else(PoisonError::into_inner);
    match entries.iter_mut().find(|(name, _)| *name == dialect) {
        Some(entry) => entry.1 = constructor,
        None => entries.push((dialect, constructor)),
    }
}

pub fn registered_dialects() -> Vec<String> {
    dialects()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(name, _)| name.clone())
        .collect()
}

pub fn get_lock_interface(dialect: &str) -> Result<Arc<dyn LockInterface>> {
    let constructor = dialects()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .find(|(name, _)| name == dialect)
        .map(|(_, constructor)| *constructor)
        .ok_or_else(|| LockError::UnknownDialect(dialect.to_string()))?;
    Ok(constructor())
}
