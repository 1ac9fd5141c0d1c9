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

use crate::error::LockError;
use std::fmt;

/// Pairs a [`LockError`] with operator-facing details and a suggested fix.
pub struct ErrorContext<'a> {
    pub error: &'a LockError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LockError) -> Self {
        let (suggestion, details) = match error {
            LockError::LockTimeout { lock_name, timeout } => (
                Some(
                    "Increase the timeout, or check whether another node holds the lock for \
                     longer than expected."
                        .to_string(),
                ),
                Some(format!(
                    "Gave up on lock '{lock_name}' after {}s of contention.",
                    timeout.as_secs_f64()
                )),
            ),
            LockError::UnableToLocateQueryInterface => (
                Some(
                    "Pass the adapter explicitly with `query_interface_name` (for example \
                     \"postgres\" or \"r2d2\")."
                        .to_string(),
                ),
                None,
            ),
            LockError::UnknownQueryInterface(name) => (
                Some("Register the adapter with `register_query_interface` first.".to_string()),
                Some(format!("No query interface is registered under '{name}'.")),
            ),
            LockError::UnknownDialect(dialect) => (
                Some("Register a lock interface with `register_dialect` first.".to_string()),
                Some(format!("No lock interface is registered for dialect '{dialect}'.")),
            ),
            LockError::IncompatibleClient { interface } => (
                Some(format!(
                    "Hand the '{interface}' adapter the client type it wraps, or drop the \
                     explicit adapter name to auto-detect."
                )),
                None,
            ),
            LockError::MissingQueryInterface => (
                Some("Provide a database client or a query interface to the builder.".to_string()),
                None,
            ),
            LockError::InvalidConfig(_) | LockError::Config(_) => (
                Some(
                    "Check the lock configuration file and DLOCK_* environment variables."
                        .to_string(),
                ),
                None,
            ),
            LockError::Database(source) => (None, Some(source.to_string())),
            _ => (None, None),
        };

        Self {
            error,
            suggestion,
            details,
        }
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

pub fn format_error_chain(error: &LockError) -> String {
    ErrorContext::new(error).to_string()
}
