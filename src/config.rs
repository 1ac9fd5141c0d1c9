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

use crate::error::{LockError, Result};
use crate::mutex::validate_table_name;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "DLOCK";
pub const DEFAULT_LOCK_TABLE_NAME: &str = "distributed_lock";
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 1200;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_SLEEP_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub lock_table_name: String,
    pub lock_ttl_seconds: u64,
    pub skip_if_obtained: bool,
    pub timeout_seconds: u64,
    pub sleep_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_interface_name: Option<String>,
    /// Installs the SIGINT/SIGTERM hook on the first `lock()` call.
    ///
    /// Once installed, either signal releases every held lock and then
    /// terminates the process with the signal's default disposition, even
    /// when no lock is held. Applications with their own shutdown handling
    /// should disable this and call `release_active_locks` themselves.
    pub install_exit_hook: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_table_name: DEFAULT_LOCK_TABLE_NAME.to_string(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
            skip_if_obtained: false,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            sleep_interval_ms: DEFAULT_SLEEP_INTERVAL_MS,
            query_interface_name: None,
            install_exit_hook: true,
        }
    }
}

impl LockConfig {
    /// Loads defaults, then the optional TOML file, then `DLOCK_*` variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if path.exists() {
                log::debug!("Loading lock config from {path:?}");
            } else {
                log::debug!("Config file not found at {path:?}, using defaults");
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let config: LockConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            LockError::InvalidConfig(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(config_path, contents)?;
        log::debug!("Saved lock config to {config_path:?}");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.lock_table_name)?;

        if self.lock_ttl_seconds == 0 {
            return Err(LockError::InvalidConfig(
                "lock_ttl_seconds must be greater than zero".to_string(),
            ));
        }

        if self.sleep_interval_ms == 0 {
            return Err(LockError::InvalidConfig(
                "sleep_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }
}
