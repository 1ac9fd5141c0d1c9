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

//! Client-library adapters.
//!
//! A [`QueryInterface`] hides the database client behind one transaction and
//! query contract, reports the SQL dialect it speaks, and classifies driver
//! errors into [`DatabaseErrorKind`]. Adapters are resolved through the
//! process-wide registry in [`registry`].

pub mod placeholders;
pub mod postgres;
pub mod registry;

pub use placeholders::{PositionalStatement, convert_named_to_positional};
pub use registry::{
    ClientHandle, QueryInterfaceRegistration, get_query_interface, locate_query_interface_name,
    register_query_interface, registered_query_interfaces,
};

use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use log::warn;
use std::collections::BTreeMap;
use std::fmt;

/// Driver-neutral value used for replacements and result columns.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(value) => write!(f, "{value}"),
            SqlValue::Int(value) => write!(f, "{value}"),
            SqlValue::Float(value) => write!(f, "{value}"),
            SqlValue::Text(value) => f.write_str(value),
            SqlValue::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

/// Named replacements bound to `:name` placeholders.
pub type Replacements = BTreeMap<String, SqlValue>;

/// A result row with columns kept in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SqlValue::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Shape of a query result, chosen by [`QueryOptions::first_result`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    First(Option<Row>),
    All(Vec<Row>),
}

impl QueryOutput {
    pub fn from_rows(rows: Vec<Row>, first_result: bool) -> Self {
        if first_result {
            QueryOutput::First(rows.into_iter().next())
        } else {
            QueryOutput::All(rows)
        }
    }

    pub fn into_first(self) -> Option<Row> {
        match self {
            QueryOutput::First(row) => row,
            QueryOutput::All(rows) => rows.into_iter().next(),
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutput::First(row) => row.into_iter().collect(),
            QueryOutput::All(rows) => rows,
        }
    }
}

/// Per-call query options.
pub struct QueryOptions<'a> {
    pub transaction: &'a mut dyn DbTransaction,
    pub replacements: Option<&'a Replacements>,
    pub first_result: bool,
}

impl<'a> QueryOptions<'a> {
    pub fn new(transaction: &'a mut dyn DbTransaction) -> Self {
        Self {
            transaction,
            replacements: None,
            first_result: false,
        }
    }

    pub fn with_replacements(mut self, replacements: &'a Replacements) -> Self {
        self.replacements = Some(replacements);
        self
    }

    pub fn first_result(mut self) -> Self {
        self.first_result = true;
        self
    }
}

/// An open transaction owned by one adapter.
///
/// `execute` receives statements already rewritten into the driver's own
/// placeholder syntax.
pub trait DbTransaction {
    fn execute(&mut self, statement: &str, arguments: &[SqlValue]) -> Result<Vec<Row>>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Classification of a driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    TableLocked,
    UniqueConstraint,
    Unknown,
}

/// Uniform transaction and query contract over one database client.
pub trait QueryInterface: Send + Sync {
    /// Registry name of this adapter.
    fn interface_name(&self) -> &str;

    /// SQL dialect used to pick the lock interface.
    fn dialect_name(&self) -> &str;

    fn query(&self, statement: &str, options: QueryOptions<'_>) -> Result<QueryOutput>;

    fn create_transaction(&self) -> Result<Box<dyn DbTransaction + '_>>;

    fn commit_transaction(&self, transaction: Box<dyn DbTransaction + '_>) -> Result<()> {
        transaction.commit()
    }

    fn rollback_transaction(&self, transaction: Box<dyn DbTransaction + '_>) -> Result<()> {
        transaction.rollback()
    }

    fn parse_database_error(&self, _error: &LockError) -> Result<DatabaseErrorKind> {
        Err(LockError::NotImplemented("parse_database_error"))
    }

    /// Classifies `error`, falling back to `Unknown` when classification fails.
    fn handle_error(&self, error: &LockError) -> DatabaseErrorKind {
        match self.parse_database_error(error) {
            Ok(kind) => kind,
            Err(parse_err) => {
                warn!(
                    "Query interface '{}' could not classify error '{error}': {parse_err}",
                    self.interface_name()
                );
                DatabaseErrorKind::Unknown
            }
        }
    }
}

impl dyn QueryInterface + '_ {
    /// Runs `callback` inside a fresh transaction.
    ///
    /// Commits when the callback succeeds. Otherwise rolls back and returns
    /// the callback's error; a failing rollback is logged and does not replace
    /// it.
    pub fn use_transaction<T, F>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(&mut dyn DbTransaction) -> Result<T>,
    {
        let mut transaction = self.create_transaction()?;
        match callback(transaction.as_mut()) {
            Ok(value) => {
                self.commit_transaction(transaction)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction(transaction) {
                    warn!(
                        "Failed to roll back transaction on '{}': {rollback_err}",
                        self.interface_name()
                    );
                }
                Err(err)
            }
        }
    }
}

/// Message-text classification shared by the bundled adapters.
pub fn classify_error_message(message: &str) -> DatabaseErrorKind {
    if message.contains("could not obtain lock") {
        return DatabaseErrorKind::TableLocked;
    }

    if message.contains("duplicate key value violates unique constraint")
        || message.contains("already exists")
    {
        return DatabaseErrorKind::UniqueConstraint;
    }

    DatabaseErrorKind::Unknown
}
