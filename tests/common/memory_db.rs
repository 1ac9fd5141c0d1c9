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

/// In-memory lock-table database for integration tests.
///
/// Mimics the parts of PostgreSQL the lock relies on: exclusive table locks
/// held until commit or rollback (optionally NOWAIT), transactional undo, an
/// owner-preserving upsert and driver errors worded like the real server.
use dlock::error::{LockError, Result};
use dlock::lock_interface::{LockInterface, register_dialect};
use dlock::query_interface::{
    ClientHandle, DatabaseErrorKind, DbTransaction, QueryInterface, QueryInterfaceRegistration,
    QueryOptions, QueryOutput, Replacements, Row, SqlValue, classify_error_message,
    convert_named_to_positional, register_query_interface,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const MEMORY: &str = "memory";

struct StoredRow {
    node_id: String,
    claimed_at: Instant,
}

enum Undo {
    CreatedTable(String),
    Inserted { table: String, mutex: String },
    Removed { table: String, mutex: String, row: StoredRow },
}

#[derive(Default)]
struct State {
    tables: HashMap<String, HashMap<String, StoredRow>>,
    holders: HashMap<String, u64>,
    next_transaction: u64,
    deletes: usize,
}

#[derive(Default)]
pub struct MemoryDatabase {
    state: StdMutex<State>,
    table_released: Condvar,
}

fn db_error(message: String) -> LockError {
    LockError::database(std::io::Error::other(message))
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    pub fn owner(&self, table: &str, mutex: &str) -> Option<String> {
        self.state()
            .tables
            .get(table)
            .and_then(|rows| rows.get(mutex))
            .map(|row| row.node_id.clone())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, HashMap::len)
    }

    /// Number of committed or pending lock-row deletions.
    pub fn delete_count(&self) -> usize {
        self.state().deletes
    }

    /// Inserts a row as if `node_id` claimed `mutex` `age` ago.
    pub fn insert_row(&self, table: &str, mutex: &str, node_id: &str, age: Duration) {
        let mut state = self.state();
        state.tables.entry(table.to_string()).or_default().insert(
            mutex.to_string(),
            StoredRow {
                node_id: node_id.to_string(),
                claimed_at: Instant::now() - age,
            },
        );
    }

    fn begin(self: &Arc<Self>) -> MemoryTransaction {
        let mut state = self.state();
        state.next_transaction += 1;
        MemoryTransaction {
            db: self.clone(),
            id: state.next_transaction,
            undo: Vec::new(),
            finished: false,
        }
    }

    fn release_table_locks(&self, state: &mut State, transaction: u64) {
        state.holders.retain(|_, holder| *holder != transaction);
        self.table_released.notify_all();
    }
}

struct MemoryTransaction {
    db: Arc<MemoryDatabase>,
    id: u64,
    undo: Vec<Undo>,
    finished: bool,
}

impl MemoryTransaction {
    fn create_table(&mut self, table: &str) -> Result<Vec<Row>> {
        let mut state = self.db.state();
        if state.tables.contains_key(table) {
            return Err(db_error(format!("relation \"{table}\" already exists")));
        }
        state.tables.insert(table.to_string(), HashMap::new());
        self.undo.push(Undo::CreatedTable(table.to_string()));
        Ok(Vec::new())
    }

    fn lock_table(&mut self, table: &str, wait: bool) -> Result<Vec<Row>> {
        let mut state = self.db.state();
        if !state.tables.contains_key(table) {
            return Err(db_error(format!("relation \"{table}\" does not exist")));
        }

        loop {
            let holder = state.holders.get(table).copied();
            match holder {
                None => {
                    state.holders.insert(table.to_string(), self.id);
                    return Ok(Vec::new());
                }
                Some(holder) if holder == self.id => return Ok(Vec::new()),
                Some(_) if !wait => {
                    return Err(db_error(format!(
                        "could not obtain lock on relation \"{table}\""
                    )));
                }
                Some(_) => {
                    state = self
                        .db
                        .table_released
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn sweep(&mut self, table: &str, ttl: Duration) -> Result<Vec<Row>> {
        let mut state = self.db.state();
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| db_error(format!("relation \"{table}\" does not exist")))?;

        let stale: Vec<String> = rows
            .iter()
            .filter(|(_, row)| row.claimed_at.elapsed() > ttl)
            .map(|(mutex, _)| mutex.clone())
            .collect();
        for mutex in stale {
            if let Some(row) = rows.remove(&mutex) {
                self.undo.push(Undo::Removed {
                    table: table.to_string(),
                    mutex,
                    row,
                });
            }
        }
        Ok(Vec::new())
    }

    fn upsert(&mut self, table: &str, mutex: &str, node_id: &str) -> Result<Vec<Row>> {
        let mut state = self.db.state();
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| db_error(format!("relation \"{table}\" does not exist")))?;

        let owner = match rows.get(mutex) {
            Some(row) => row.node_id.clone(),
            None => {
                rows.insert(
                    mutex.to_string(),
                    StoredRow {
                        node_id: node_id.to_string(),
                        claimed_at: Instant::now(),
                    },
                );
                self.undo.push(Undo::Inserted {
                    table: table.to_string(),
                    mutex: mutex.to_string(),
                });
                node_id.to_string()
            }
        };
        Ok(vec![Row::new().with("node_id", owner)])
    }

    fn delete(&mut self, table: &str, mutex: &str, node_id: &str) -> Result<Vec<Row>> {
        let mut state = self.db.state();
        state.deletes += 1;
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| db_error(format!("relation \"{table}\" does not exist")))?;

        if rows.get(mutex).is_some_and(|row| row.node_id == node_id)
            && let Some(row) = rows.remove(mutex)
        {
            self.undo.push(Undo::Removed {
                table: table.to_string(),
                mutex: mutex.to_string(),
                row,
            });
        }
        Ok(Vec::new())
    }

    fn finish(&mut self, apply_undo: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self.db.state();
        if apply_undo {
            while let Some(undo) = self.undo.pop() {
                match undo {
                    Undo::CreatedTable(table) => {
                        state.tables.remove(&table);
                    }
                    Undo::Inserted { table, mutex } => {
                        if let Some(rows) = state.tables.get_mut(&table) {
                            rows.remove(&mutex);
                        }
                    }
                    Undo::Removed { table, mutex, row } => {
                        if let Some(rows) = state.tables.get_mut(&table) {
                            rows.insert(mutex, row);
                        }
                    }
                }
            }
        }
        self.undo.clear();
        self.db.release_table_locks(&mut state, self.id);
    }
}

fn text_argument(arguments: &[SqlValue], index: usize) -> Result<&str> {
    arguments
        .get(index)
        .and_then(SqlValue::as_str)
        .ok_or_else(|| db_error(format!("there is no parameter ${}", index + 1)))
}

impl DbTransaction for MemoryTransaction {
    fn execute(&mut self, statement: &str, arguments: &[SqlValue]) -> Result<Vec<Row>> {
        let parts: Vec<&str> = statement.split_whitespace().collect();
        match parts.as_slice() {
            ["CREATE", "TABLE", table] => self.create_table(table),
            ["LOCK", table, "NOWAIT"] => self.lock_table(table, false),
            ["LOCK", table, "WAIT"] => self.lock_table(table, true),
            ["SWEEP", table, ttl_ms] => {
                let ttl_ms = ttl_ms
                    .parse::<u64>()
                    .map_err(|e| db_error(format!("invalid interval: {e}")))?;
                self.sweep(table, Duration::from_millis(ttl_ms))
            }
            ["UPSERT", table, "$1", "$2"] => {
                let mutex = text_argument(arguments, 0)?;
                let node_id = text_argument(arguments, 1)?;
                self.upsert(table, mutex, node_id)
            }
            ["DELETE", table, "$1", "$2"] => {
                let mutex = text_argument(arguments, 0)?;
                let node_id = text_argument(arguments, 1)?;
                self.delete(table, mutex, node_id)
            }
            _ => Err(db_error(format!("syntax error at or near \"{statement}\""))),
        }
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish(false);
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish(true);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish(true);
    }
}

pub struct MemoryQueryInterface {
    db: Arc<MemoryDatabase>,
}

impl MemoryQueryInterface {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self { db }
    }

    fn check_interface(client: &(dyn Any + Send)) -> bool {
        client.is::<Arc<MemoryDatabase>>()
    }

    fn construct(client: ClientHandle) -> Result<Arc<dyn QueryInterface>> {
        let db = client
            .downcast::<Arc<MemoryDatabase>>()
            .map_err(|_| LockError::IncompatibleClient {
                interface: MEMORY.to_string(),
            })?;
        Ok(Arc::new(MemoryQueryInterface::new(*db)))
    }
}

impl QueryInterface for MemoryQueryInterface {
    fn interface_name(&self) -> &str {
        MEMORY
    }

    fn dialect_name(&self) -> &str {
        MEMORY
    }

    fn query(&self, statement: &str, options: QueryOptions<'_>) -> Result<QueryOutput> {
        let empty = Replacements::new();
        let positional =
            convert_named_to_positional(statement, options.replacements.unwrap_or(&empty));
        let rows = options
            .transaction
            .execute(&positional.statement, &positional.arguments)?;
        Ok(QueryOutput::from_rows(rows, options.first_result))
    }

    fn create_transaction(&self) -> Result<Box<dyn DbTransaction + '_>> {
        Ok(Box::new(self.db.begin()))
    }

    fn parse_database_error(&self, error: &LockError) -> Result<DatabaseErrorKind> {
        Ok(error
            .driver_error()
            .map(|driver| classify_error_message(&driver.to_string()))
            .unwrap_or(DatabaseErrorKind::Unknown))
    }
}

/// Dialect emitting the statement forms [`MemoryTransaction`] understands.
pub struct MemoryLock;

impl MemoryLock {
    fn construct() -> Arc<dyn LockInterface> {
        Arc::new(MemoryLock)
    }
}

impl LockInterface for MemoryLock {
    fn dialect(&self) -> &str {
        MEMORY
    }

    fn create_lock_table(&self, table: &str) -> String {
        format!("CREATE TABLE {table}")
    }

    fn remove_stale_locks(&self, table: &str, ttl: Duration) -> String {
        format!("SWEEP {table} {}", ttl.as_millis())
    }

    fn lock_table(&self, table: &str, wait: bool) -> String {
        if wait {
            format!("LOCK {table} WAIT")
        } else {
            format!("LOCK {table} NOWAIT")
        }
    }

    fn obtain_mutex(&self, table: &str) -> String {
        format!("UPSERT {table} :mutex :node_id")
    }

    fn remove_mutex(&self, table: &str) -> String {
        format!("DELETE {table} :mutex :node_id")
    }
}

/// Registers the memory dialect and query interface.
pub fn install() {
    register_dialect(MEMORY, MemoryLock::construct);
    register_query_interface(
        QueryInterfaceRegistration::new(MEMORY, MemoryQueryInterface::construct)
            .with_check(MemoryQueryInterface::check_interface),
    );
}
