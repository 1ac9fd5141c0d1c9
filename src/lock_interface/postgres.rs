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
use crate::lock_interface::LockInterface;
use std::sync::Arc;
use std::time::Duration;

/// PostgreSQL lock-table statements.
///
/// Mutual exclusion comes from `LOCK TABLE ... IN ACCESS EXCLUSIVE MODE`; the
/// upsert never changes an existing owner, so `RETURNING node_id` reports
/// whoever holds the row.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresLock;

impl PostgresLock {
    pub const DIALECT: &'static str = "postgres";

    pub(crate) fn construct() -> Arc<dyn LockInterface> {
        Arc::new(PostgresLock)
    }
}

impl LockInterface for PostgresLock {
    fn dialect(&self) -> &str {
        Self::DIALECT
    }

    fn create_schema(&self, schema: &str) -> Result<String> {
        Ok(format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
    }

    fn create_lock_table(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             mutex VARCHAR(255) NOT NULL, \
             ts TIMESTAMPTZ NOT NULL, \
             node_id VARCHAR(255) NOT NULL, \
             PRIMARY KEY (mutex))"
        )
    }

    fn remove_stale_locks(&self, table: &str, ttl: Duration) -> String {
        format!(
            "DELETE FROM {table} WHERE ts < NOW() - INTERVAL '{} seconds'",
            ttl.as_secs_f64()
        )
    }

    fn lock_table(&self, table: &str, wait: bool) -> String {
        if wait {
            format!("LOCK TABLE {table} IN ACCESS EXCLUSIVE MODE")
        } else {
            format!("LOCK TABLE {table} IN ACCESS EXCLUSIVE MODE NOWAIT")
        }
    }

    fn obtain_mutex(&self, table: &str) -> String {
        format!(
            "INSERT INTO {table} (mutex, ts, node_id) VALUES (:mutex, NOW(), :node_id) \
             ON CONFLICT (mutex) DO UPDATE SET mutex = EXCLUDED.mutex \
             RETURNING node_id"
        )
    }

    fn remove_mutex(&self, table: &str) -> String {
        format!("DELETE FROM {table} WHERE mutex = :mutex AND node_id = :node_id")
    }
}
