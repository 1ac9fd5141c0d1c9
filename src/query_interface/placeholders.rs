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

//! Named to positional placeholder translation.
//!
//! Dialect adapters write statements with `:name` placeholders. Drivers that
//! only understand `$1`, `$2`, ... run them through
//! [`convert_named_to_positional`] first.

use crate::query_interface::{Replacements, SqlValue};
use regex::{Captures, Regex};
use std::sync::LazyLock;

// `::` is matched first so casts such as `'1'::int` never produce a token.
static NAMED_PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::|:([A-Za-z_][A-Za-z0-9_]*)").expect("named parameter pattern is valid")
});

/// A statement rewritten to positional placeholders plus its bound arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalStatement {
    pub statement: String,
    pub arguments: Vec<SqlValue>,
}

/// Rewrites every `:name` token that has a replacement to `$n`.
///
/// Tokens are numbered in encounter order and a name used twice is bound
/// twice. Tokens without a replacement are left as written.
pub fn convert_named_to_positional(
    statement: &str,
    replacements: &Replacements,
) -> PositionalStatement {
    let mut arguments = Vec::new();
    let rewritten = NAMED_PARAMETER.replace_all(statement, |caps: &Captures| {
        match caps
            .get(1)
            .and_then(|name| replacements.get(name.as_str()))
        {
            Some(value) => {
                arguments.push(value.clone());
                format!("${}", arguments.len())
            }
            None => caps[0].to_string(),
        }
    });

    PositionalStatement {
        statement: rewritten.into_owned(),
        arguments,
    }
}
