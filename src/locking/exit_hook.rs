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

//! Signal-driven release of held locks.
//!
//! On the first SIGINT or SIGTERM a listener thread drains the active lock
//! registry, releasing each lock, and then re-raises the signal with its
//! default disposition so the process still terminates.

use log::warn;
use std::sync::OnceLock;

#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM};

/// Whether the exit hook is active in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitHookStatus {
    Installed,
    Unsupported,
    Failed,
}

impl ExitHookStatus {
    pub fn is_installed(self) -> bool {
        matches!(self, ExitHookStatus::Installed)
    }
}

static EXIT_HOOK: OnceLock<ExitHookStatus> = OnceLock::new();

#[cfg(unix)]
fn registered_signals() -> &'static [i32] {
    static SIGNALS: [i32; 2] = [SIGINT, SIGTERM];
    &SIGNALS
}

/// Installs the exit hook once per process; later calls return the first
/// outcome.
///
/// The hook owns SIGINT and SIGTERM from then on: on either signal it
/// releases the registered locks and terminates the process, whether or not
/// any lock is held.
pub fn install() -> ExitHookStatus {
    *EXIT_HOOK.get_or_init(install_listener)
}

/// Returns the hook status without installing it.
pub fn status() -> Option<ExitHookStatus> {
    EXIT_HOOK.get().copied()
}

#[cfg(unix)]
fn install_listener() -> ExitHookStatus {
    use crate::locking::active::{active_lock_count, release_active_locks};
    use log::info;
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = match Signals::new(registered_signals()) {
        Ok(signals) => signals,
        Err(err) => {
            warn!("Failed to register exit hook signal handlers: {err}");
            return ExitHookStatus::Failed;
        }
    };

    let spawned = thread::Builder::new()
        .name("dlock-exit-hook".to_string())
        .spawn(move || {
            let Some(signal) = signals.forever().next() else {
                return;
            };

            info!(
                "Received signal {signal}, releasing {} active lock(s)",
                active_lock_count()
            );
            let report = release_active_locks();
            if !report.is_clean() {
                warn!(
                    "{} lock(s) could not be released during shutdown",
                    report.failures.len()
                );
            }

            if let Err(err) = signal_hook::low_level::emulate_default_handler(signal) {
                warn!("Failed to restore default handler for signal {signal}: {err}");
                std::process::exit(128 + signal);
            }
        });

    match spawned {
        Ok(_) => ExitHookStatus::Installed,
        Err(err) => {
            warn!("Failed to start exit hook thread: {err}");
            ExitHookStatus::Failed
        }
    }
}

#[cfg(not(unix))]
fn install_listener() -> ExitHookStatus {
    warn!("Exit hook is not supported on this platform; held locks expire by TTL");
    ExitHookStatus::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let first = install();
        assert_eq!(install(), first);
        assert_eq!(status(), Some(first));
        #[cfg(unix)]
        assert!(first.is_installed());
    }
}
