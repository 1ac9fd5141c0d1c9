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

mod context;

pub use context::{ErrorContext, format_error_chain};

use std::time::Duration;
use thiserror::Error;

/// Boxed driver error carried by [`LockError::Database`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("The lock {lock_name} is being held by the node {owner}")]
    AlreadyObtained { lock_name: String, owner: String },

    #[error("The table {table} is currently locked")]
    TableLocked { table: String },

    #[error("Unable to obtain the lock {lock_name} within {} seconds", .timeout.as_secs_f64())]
    LockTimeout { lock_name: String, timeout: Duration },

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Unknown SQL dialect {0}")]
    UnknownDialect(String),

    #[error("Unknown query interface {0}")]
    UnknownQueryInterface(String),

    #[error("Unable to locate the query interface type")]
    UnableToLocateQueryInterface,

    #[error("The client handed to query interface '{interface}' has an unsupported type")]
    IncompatibleClient { interface: String },

    #[error("Query interface required")]
    MissingQueryInterface,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unexpected query result: {0}")]
    UnexpectedResult(String),

    #[error("Database error: {0}")]
    Database(#[source] DriverError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LockError {
    /// Wraps a driver-specific error so adapters can classify it later.
    pub fn database<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LockError::Database(Box::new(err))
    }

    /// True for the conditions the acquisition loop turns into retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::AlreadyObtained { .. } | LockError::TableLocked { .. }
        )
    }

    /// Returns the driver error when this is a database failure.
    pub fn driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            LockError::Database(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<postgres::Error> for LockError {
    fn from(err: postgres::Error) -> Self {
        LockError::database(err)
    }
}

impl From<r2d2::Error> for LockError {
    fn from(err: r2d2::Error) -> Self {
        LockError::database(err)
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
