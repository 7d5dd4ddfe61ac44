// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the state-machine runtime.
//!
//! Every fault family gets its own `thiserror` enum so call sites can `?`
//! across them via [`EngineError`]. Separately, every fault is also wrapped in
//! an [`ExceptionContext`] — the payload actually threaded through the
//! framework's own exception-action lists and the process-wide sink, mirroring
//! a context object rather than a typed `Result`.

use std::fmt;
use std::time::SystemTime;

/// Faults raised while building the state graph (construction-time, programmer error).
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("region {region} already has an initial state, cannot add a second")]
    DuplicateInitialState { region: String },

    #[error("invalid self-transition on {state}: no trigger or guard given")]
    InvalidSelfTransition { state: String },

    #[error("invalid local transition {transition}: source {source} is neither parent of nor equal to target {target}")]
    InvalidLocalTransition {
        transition: String,
        source: String,
        target: String,
    },

    #[error("choice state {state} has more than one else (guardless) transition")]
    ChoiceMultipleElse { state: String },

    #[error("region {region} has no parent composite state")]
    RegionHasNoParent { region: String },
}

/// Faults raised while evaluating user-supplied guards or executing actions.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{transition} guard exception: {message}")]
    GuardFault { transition: String, message: String },

    #[error("{source} action execution exception: {message}")]
    ActionFault { source: String, message: String },
}

/// Faults raised by lifecycle control (start/stop/reset/terminate).
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{name} was unable to terminate within {timeout_ms}ms")]
    TerminationTimeout { name: String, timeout_ms: u64 },

    #[error("cannot schedule {action} on a terminated timer")]
    TimerTerminated { action: String },
}

/// Raised when a state machine's consecutive-loop counter exceeds its configured limit.
#[derive(Debug, thiserror::Error)]
#[error("{machine} exceeded consecutive-loop limit of {limit}; machine is ill-formed or livelocking")]
pub struct LoopSafetyError {
    pub machine: String,
    pub limit: u32,
}

/// Union of every fault family, for `?`-propagation inside the crate.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    LoopSafety(#[from] LoopSafetyError),
}

/// The cross-cutting payload routed through exception-action lists and the
/// global sink. Carries the originating object's name and a flattened message
/// rather than a typed error, because local and global handlers alike only
/// ever care about "what broke and what did it say".
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    pub source: String,
    pub message: String,
    pub occurred_at_epoch_ms: u64,
}

impl ExceptionContext {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            occurred_at_epoch_ms: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    pub fn from_error(source: impl Into<String>, error: &dyn std::error::Error) -> Self {
        Self::new(source, error.to_string())
    }
}

impl fmt::Display for ExceptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
