// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime tunables, collecting the class-level constants the source
//! implementation hard-codes (see `SPEC_FULL.md` §10.3 for provenance).

use serde::{Deserialize, Serialize};

/// Tunables shared by every thread, event handler, and state machine in a
/// process. Defaults match the numeric constants observed in the original
/// implementation so behavior is unchanged unless a host explicitly overrides
/// a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound a caller will block in `terminate(wait = true)` before
    /// raising a [`crate::error::LifecycleError::TerminationTimeout`].
    pub termination_timeout_ms: u64,
    /// Poll interval used while spinning for termination.
    pub termination_poll_interval_ms: u64,
    /// Consecutive RTC iterations (with no intervening empty-queue
    /// observation) before a state machine raises
    /// [`crate::error::LoopSafetyError`].
    pub consecutive_loop_limit: u32,
    /// Timer dispatch lag, in milliseconds, beyond which the time-gap
    /// diagnostic hook fires.
    pub max_allowable_time_gap_ms: u64,
    /// Whether enqueue/dispatch tracing is enabled by default for newly
    /// constructed event threads, handlers, and machines.
    pub logging_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            termination_timeout_ms: 60_000,
            termination_poll_interval_ms: 10,
            consecutive_loop_limit: 100,
            max_allowable_time_gap_ms: 5_000,
            logging_enabled: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
