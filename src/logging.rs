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

use log::SetLoggerError;

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "dlock=warn",
        1 => "dlock=info",
        2 => "dlock=debug",
        _ => "dlock=trace",
    }
}

fn builder(verbose: u8) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(verbose)),
    );
    builder
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false);
    builder
}

/// Initialize the logger with the specified verbosity level
///
/// # Arguments
/// * `verbose` - Verbosity level (0=warn, 1=info, 2=debug, 3+=trace)
///
/// `RUST_LOG` takes precedence over the verbosity level. Panics if a logger
/// is already installed.
pub fn setup_logger(verbose: u8) {
    builder(verbose).init();
}

/// Like [`setup_logger`], but reports an already installed logger instead of
/// panicking.
pub fn try_setup_logger(verbose: u8) -> Result<(), SetLoggerError> {
    builder(verbose).try_init()
}
