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

//! Adapters for the synchronous `postgres` driver.
//!
//! Both adapters speak positional placeholders only, so statements are passed
//! through [`convert_named_to_positional`] before execution. Every transaction
//! runs at `SERIALIZABLE` isolation.

use crate::error::{LockError, Result};
use crate::query_interface::registry::{ClientHandle, QueryInterfaceRegistration};
use crate::query_interface::{
    DatabaseErrorKind, DbTransaction, QueryInterface, QueryOptions, QueryOutput, Row, SqlValue,
    classify_error_message, convert_named_to_positional,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use postgres::error::SqlState;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls};
use r2d2_postgres::PostgresConnectionManager;
use std::any::Any;
use std::ops::DerefMut;
use std::sync::{Arc, Mutex, PoisonError};

pub const POSTGRES_DIALECT: &str = "postgres";

const BEGIN_SERIALIZABLE: &str = "BEGIN ISOLATION LEVEL SERIALIZABLE";

pub type PostgresPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;

/// A transaction driven with explicit `BEGIN`/`COMMIT`/`ROLLBACK` on a
/// connection the transaction holds exclusively.
///
/// Dropping an unfinished transaction rolls it back so a pooled connection is
/// never returned mid-transaction.
pub struct PostgresTransaction<C>
where
    C: DerefMut<Target = Client>,
{
    conn: C,
    finished: bool,
}

impl<C> PostgresTransaction<C>
where
    C: DerefMut<Target = Client>,
{
    pub fn begin(mut conn: C) -> Result<Self> {
        conn.batch_execute(BEGIN_SERIALIZABLE)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }
}

impl<C> DbTransaction for PostgresTransaction<C>
where
    C: DerefMut<Target = Client>,
{
    fn execute(&mut self, statement: &str, arguments: &[SqlValue]) -> Result<Vec<Row>> {
        let bound: Vec<Box<dyn ToSql + Sync>> = arguments.iter().map(to_sql_argument).collect();
        let params: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|arg| arg.as_ref()).collect();
        let rows = self.conn.query(statement, &params)?;
        rows.iter().map(convert_row).collect()
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.batch_execute("ROLLBACK")?;
        Ok(())
    }
}

impl<C> Drop for PostgresTransaction<C>
where
    C: DerefMut<Target = Client>,
{
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        if let Err(err) = self.conn.batch_execute("ROLLBACK") {
            warn!("Failed to roll back abandoned transaction: {err}");
        } else {
            debug!("Rolled back abandoned transaction on drop");
        }
    }
}

fn to_sql_argument(value: &SqlValue) -> Box<dyn ToSql + Sync> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(value) => Box::new(*value),
        SqlValue::Int(value) => Box::new(*value),
        SqlValue::Float(value) => Box::new(*value),
        SqlValue::Text(value) => Box::new(value.clone()),
        SqlValue::Timestamp(value) => Box::new(*value),
    }
}

fn convert_row(row: &postgres::Row) -> Result<Row> {
    let mut converted = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = convert_column(row, index, column.type_())?;
        converted.push(column.name(), value);
    }
    Ok(converted)
}

fn convert_column(row: &postgres::Row, index: usize, ty: &Type) -> Result<SqlValue> {
    let value = match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(index)?
            .map_or(SqlValue::Null, SqlValue::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)?
            .map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)?
            .map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(index)?
            .map_or(SqlValue::Null, SqlValue::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map_or(SqlValue::Null, |v| SqlValue::Float(v.into())),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(index)?
            .map_or(SqlValue::Null, SqlValue::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(index)?
            .map_or(SqlValue::Null, SqlValue::Text),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map_or(SqlValue::Null, SqlValue::Timestamp),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map_or(SqlValue::Null, |v| SqlValue::Timestamp(v.and_utc())),
        ref other => {
            return Err(LockError::UnexpectedResult(format!(
                "unsupported column type {other} in column {index}"
            )));
        }
    };
    Ok(value)
}

fn run_query(statement: &str, options: QueryOptions<'_>) -> Result<QueryOutput> {
    let rows = match options.replacements {
        Some(replacements) => {
            let positional = convert_named_to_positional(statement, replacements);
            options
                .transaction
                .execute(&positional.statement, &positional.arguments)?
        }
        None => options.transaction.execute(statement, &[])?,
    };
    Ok(QueryOutput::from_rows(rows, options.first_result))
}

/// Classifies by SQLSTATE when the driver reports one, then by message text.
fn classify_postgres_error(error: &LockError) -> DatabaseErrorKind {
    let Some(driver) = error.driver_error() else {
        return DatabaseErrorKind::Unknown;
    };

    if let Some(pg) = driver.downcast_ref::<postgres::Error>() {
        if let Some(code) = pg.code() {
            if *code == SqlState::LOCK_NOT_AVAILABLE || *code == SqlState::T_R_SERIALIZATION_FAILURE
            {
                return DatabaseErrorKind::TableLocked;
            }
            if *code == SqlState::UNIQUE_VIOLATION
                || *code == SqlState::DUPLICATE_TABLE
                || *code == SqlState::DUPLICATE_SCHEMA
                || *code == SqlState::DUPLICATE_OBJECT
            {
                return DatabaseErrorKind::UniqueConstraint;
            }
        }
        if let Some(db_error) = pg.as_db_error() {
            return classify_error_message(db_error.message());
        }
    }

    classify_error_message(&driver.to_string())
}

/// Adapter over a single `postgres::Client`.
///
/// The client is held for the whole lifetime of each transaction, so
/// transactions issued through one adapter run one after another.
pub struct PostgresQueryInterface {
    client: Mutex<Client>,
}

impl PostgresQueryInterface {
    pub const INTERFACE_NAME: &'static str = "postgres";

    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    pub fn registration() -> QueryInterfaceRegistration {
        QueryInterfaceRegistration::new(Self::INTERFACE_NAME, Self::construct)
            .with_check(Self::check_interface)
    }

    pub fn check_interface(client: &(dyn Any + Send)) -> bool {
        client.is::<Client>()
    }

    fn construct(client: ClientHandle) -> Result<Arc<dyn QueryInterface>> {
        let client = client
            .downcast::<Client>()
            .map_err(|_| LockError::IncompatibleClient {
                interface: Self::INTERFACE_NAME.to_string(),
            })?;
        Ok(Arc::new(Self::new(*client)))
    }
}

impl QueryInterface for PostgresQueryInterface {
    fn interface_name(&self) -> &str {
        Self::INTERFACE_NAME
    }

    fn dialect_name(&self) -> &str {
        POSTGRES_DIALECT
    }

    fn query(&self, statement: &str, options: QueryOptions<'_>) -> Result<QueryOutput> {
        run_query(statement, options)
    }

    fn create_transaction(&self) -> Result<Box<dyn DbTransaction + '_>> {
        let guard = self.client.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering postgres client after a panic in another transaction");
            PoisonError::into_inner(poisoned)
        });
        Ok(Box::new(PostgresTransaction::begin(guard)?))
    }

    fn parse_database_error(&self, error: &LockError) -> Result<DatabaseErrorKind> {
        Ok(classify_postgres_error(error))
    }
}

/// Adapter over an `r2d2` pool of postgres connections.
///
/// Each transaction checks out its own connection, so transactions from
/// different threads run concurrently.
pub struct PostgresPoolQueryInterface {
    pool: PostgresPool,
}

impl PostgresPoolQueryInterface {
    pub const INTERFACE_NAME: &'static str = "r2d2";

    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    pub fn registration() -> QueryInterfaceRegistration {
        QueryInterfaceRegistration::new(Self::INTERFACE_NAME, Self::construct)
            .with_check(Self::check_interface)
    }

    pub fn check_interface(client: &(dyn Any + Send)) -> bool {
        client.is::<PostgresPool>()
    }

    fn construct(client: ClientHandle) -> Result<Arc<dyn QueryInterface>> {
        let pool = client
            .downcast::<PostgresPool>()
            .map_err(|_| LockError::IncompatibleClient {
                interface: Self::INTERFACE_NAME.to_string(),
            })?;
        Ok(Arc::new(Self::new(*pool)))
    }

    pub fn pool(&self) -> &PostgresPool {
        &self.pool
    }
}

impl QueryInterface for PostgresPoolQueryInterface {
    fn interface_name(&self) -> &str {
        Self::INTERFACE_NAME
    }

    fn dialect_name(&self) -> &str {
        POSTGRES_DIALECT
    }

    fn query(&self, statement: &str, options: QueryOptions<'_>) -> Result<QueryOutput> {
        run_query(statement, options)
    }

    fn create_transaction(&self) -> Result<Box<dyn DbTransaction + '_>> {
        let conn = self.pool.get()?;
        Ok(Box::new(PostgresTransaction::begin(conn)?))
    }

    fn parse_database_error(&self, error: &LockError) -> Result<DatabaseErrorKind> {
        Ok(classify_postgres_error(error))
    }
}
