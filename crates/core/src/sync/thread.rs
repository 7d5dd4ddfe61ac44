// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread wrapper implementing the two-phase cooperative termination
//! protocol (`SPEC_FULL.md` §3, §10.4): a stop request flips a flag the
//! thread body polls, and the caller then waits up to a bounded timeout
//! before giving up on a clean join.
//!
//! Rust's standard library has no portable thread-priority API; `ThreadPriority`
//! is carried as metadata a host can act on (e.g. via a platform-specific
//! crate) but is not applied by this wrapper. See §10.4 for the rationale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::ids::ThreadId;

/// Advisory scheduling hint. Not enforced by this crate; see module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Outcome of waiting for a thread to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// The thread body observed the stop request and returned.
    Completed,
    /// The join timeout elapsed before the thread returned.
    TimedOut,
}

/// Polled by a thread body to learn whether a stop has been requested.
#[derive(Clone)]
pub struct StopToken {
    stop: Arc<AtomicBool>,
}

impl StopToken {
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// A named, cooperatively-stoppable thread.
pub struct Thread {
    id: ThreadId,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Thread {
    /// Spawns `body` on a new OS thread. `body` receives a [`StopToken`] it
    /// is expected to poll between units of work (e.g. once per RTC step).
    pub fn spawn<F>(name: impl Into<String>, _priority: ThreadPriority, body: F) -> Self
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let id = ThreadId::new();
        let stop = Arc::new(AtomicBool::new(false));
        let token = StopToken {
            stop: Arc::clone(&stop),
        };
        // OS thread creation failing means the process is out of resources
        // to run at all; there is no degraded mode to fall back to here.
        #[allow(clippy::expect_used)]
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || body(token))
            .expect("failed to spawn OS thread");
        Self {
            id,
            stop,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    /// Flips the stop flag. Does not block; the thread body observes it on
    /// its own schedule.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Polls for termination up to `timeout`, checking every `poll_interval`.
    /// Consumes the handle: whether this returns `Completed` or `TimedOut`,
    /// the underlying `JoinHandle` has either been joined or abandoned — a
    /// timed-out thread is left running and will be joined, if ever, only
    /// when the process exits.
    pub fn join_with_timeout(
        mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> TerminationStatus {
        let Some(handle) = self.handle.take() else {
            return TerminationStatus::Completed;
        };
        if !handle.is_finished() {
            let deadline = Instant::now() + timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(poll_interval);
            }
        }
        if handle.is_finished() {
            let _ = handle.join();
            TerminationStatus::Completed
        } else {
            TerminationStatus::TimedOut
        }
    }
}

#[cfg(test)]
#[path = "thread_tests.rs"]
mod tests;
