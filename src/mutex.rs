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

//! Transactional lock-table primitives.
//!
//! Every operation runs in its own serializable transaction: the lock table is
//! locked first, stale rows are swept, and only then is the lock row touched.

use crate::error::{LockError, Result};
use crate::lock_interface::{LockInterface, get_lock_interface};
use crate::query_interface::{
    DatabaseErrorKind, DbTransaction, QueryInterface, QueryOptions, Replacements, SqlValue,
};
use log::debug;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("table name pattern is valid")
});

/// Lock-table operations a `DistributedLock` depends on.
pub trait MutexBackend: Send + Sync {
    /// Creates the lock table when missing. Safe to call concurrently.
    fn initialize_lock_table(&self) -> Result<()>;

    /// Claims `lock_name` for `node_id`, failing with
    /// [`LockError::AlreadyObtained`] when another node holds it.
    fn obtain_lock(&self, lock_name: &str, node_id: &str) -> Result<()>;

    /// Deletes the row for `lock_name` if `node_id` still owns it.
    fn release_lock(&self, lock_name: &str, node_id: &str) -> Result<()>;
}

pub struct Mutex {
    query_interface: Arc<dyn QueryInterface>,
    lock_interface: Arc<dyn LockInterface>,
    lock_table_name: String,
    lock_ttl: Duration,
}

impl Mutex {
    /// Builds a mutex using the dialect reported by `query_interface`.
    pub fn new(
        query_interface: Arc<dyn QueryInterface>,
        lock_table_name: impl Into<String>,
        lock_ttl: Duration,
    ) -> Result<Self> {
        let lock_interface = get_lock_interface(query_interface.dialect_name())?;
        Self::with_lock_interface(query_interface, lock_interface, lock_table_name, lock_ttl)
    }

    pub fn with_lock_interface(
        query_interface: Arc<dyn QueryInterface>,
        lock_interface: Arc<dyn LockInterface>,
        lock_table_name: impl Into<String>,
        lock_ttl: Duration,
    ) -> Result<Self> {
        let lock_table_name = lock_table_name.into();
        validate_table_name(&lock_table_name)?;
        if lock_ttl.is_zero() {
            return Err(LockError::InvalidConfig(
                "lock TTL must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            query_interface,
            lock_interface,
            lock_table_name,
            lock_ttl,
        })
    }

    pub fn lock_table_name(&self) -> &str {
        &self.lock_table_name
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    pub fn query_interface(&self) -> &Arc<dyn QueryInterface> {
        &self.query_interface
    }

    pub fn lock_interface(&self) -> &Arc<dyn LockInterface> {
        &self.lock_interface
    }

    /// Runs `callback` with the lock table held and stale rows swept.
    ///
    /// `wait = false` fails fast with [`LockError::TableLocked`] when another
    /// transaction holds the table.
    pub fn with_lock<T, F>(&self, callback: F, wait: bool) -> Result<T>
    where
        F: FnOnce(&mut dyn DbTransaction) -> Result<T>,
    {
        let lock_statement = self.lock_interface.lock_table(&self.lock_table_name, wait);
        let sweep_statement = self
            .lock_interface
            .remove_stale_locks(&self.lock_table_name, self.lock_ttl);

        self.query_interface
            .as_ref()
            .use_transaction(|transaction| {
                self.query_interface
                    .query(&lock_statement, QueryOptions::new(&mut *transaction))?;
                self.query_interface
                    .query(&sweep_statement, QueryOptions::new(&mut *transaction))?;
                callback(transaction)
            })
            .map_err(|err| self.classify(err))
    }

    fn classify(&self, err: LockError) -> LockError {
        if err.driver_error().is_none() {
            return err;
        }

        match self.query_interface.handle_error(&err) {
            DatabaseErrorKind::TableLocked => LockError::TableLocked {
                table: self.lock_table_name.clone(),
            },
            _ => err,
        }
    }

    /// Executes a create statement, treating "already exists" as success.
    fn create_if_missing(&self, statement: &str) -> Result<()> {
        let result = self.query_interface.as_ref().use_transaction(|transaction| {
            self.query_interface
                .query(statement, QueryOptions::new(transaction))
                .map(|_| ())
        });

        match result {
            Err(err)
                if err.driver_error().is_some()
                    && self.query_interface.handle_error(&err)
                        == DatabaseErrorKind::UniqueConstraint =>
            {
                debug!("Ignoring concurrent creation: {err}");
                Ok(())
            }
            other => other,
        }
    }
}

fn mutex_replacements(lock_name: &str, node_id: &str) -> Replacements {
    let mut replacements = Replacements::new();
    replacements.insert("mutex".to_string(), SqlValue::from(lock_name));
    replacements.insert("node_id".to_string(), SqlValue::from(node_id));
    replacements
}

impl MutexBackend for Mutex {
    fn initialize_lock_table(&self) -> Result<()> {
        if let Some((schema, _)) = self.lock_table_name.split_once('.') {
            match self.lock_interface.create_schema(schema) {
                Ok(statement) => self.create_if_missing(&statement)?,
                Err(LockError::NotImplemented(_)) => debug!(
                    "Dialect '{}' has no schema support, assuming '{schema}' exists",
                    self.lock_interface.dialect()
                ),
                Err(err) => return Err(err),
            }
        }

        let statement = self.lock_interface.create_lock_table(&self.lock_table_name);
        self.create_if_missing(&statement)
    }

    fn obtain_lock(&self, lock_name: &str, node_id: &str) -> Result<()> {
        let statement = self.lock_interface.obtain_mutex(&self.lock_table_name);
        let replacements = mutex_replacements(lock_name, node_id);
        let owner_column = self.lock_interface.owner_column();

        // The owner is compared after commit so a contended claim still ends
        // its transaction cleanly.
        let owner = self.with_lock(
            |transaction| {
                let row = self
                    .query_interface
                    .query(
                        &statement,
                        QueryOptions::new(transaction)
                            .with_replacements(&replacements)
                            .first_result(),
                    )?
                    .into_first()
                    .ok_or_else(|| {
                        LockError::UnexpectedResult(format!(
                            "claim of lock {lock_name} returned no row"
                        ))
                    })?;

                row.get_str(owner_column).map(str::to_string).ok_or_else(|| {
                    LockError::UnexpectedResult(format!(
                        "claim of lock {lock_name} returned no '{owner_column}' column"
                    ))
                })
            },
            false,
        )?;

        if owner != node_id {
            return Err(LockError::AlreadyObtained {
                lock_name: lock_name.to_string(),
                owner,
            });
        }

        Ok(())
    }

    fn release_lock(&self, lock_name: &str, node_id: &str) -> Result<()> {
        let statement = self.lock_interface.remove_mutex(&self.lock_table_name);
        let replacements = mutex_replacements(lock_name, node_id);

        self.with_lock(
            |transaction| {
                self.query_interface
                    .query(
                        &statement,
                        QueryOptions::new(transaction).with_replacements(&replacements),
                    )
                    .map(|_| ())
            },
            true,
        )
    }
}

/// Accepts `name` or `schema.name` made of ASCII letters, digits and
/// underscores, not starting with a digit.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(LockError::InvalidConfig(format!(
            "invalid lock table name '{name}'"
        )))
    }
}
