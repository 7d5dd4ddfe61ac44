// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The environment registry: the process-wide home for the timer, the
//! exception sink, and every event thread spawned by the host, so shutdown
//! can terminate them in the right order (`SPEC_FULL.md` §2 "Environment
//! registry", §9 "Global state").
//!
//! Modeled as an explicit service the host constructs once, rather than a
//! hidden process singleton (`OnceLock`/`lazy_static`) — the source treats
//! the timer thread, the environment, and the exception sink as process
//! singletons, but §9 prefers an explicit service object over global mutable
//! state, so two `Environment`s in one process (e.g. in tests) never
//! contend for the same timer thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;

use hsm_core::{
    Clock, ExceptionContext, RuntimeConfig, SmallFields, SystemClock, TerminationStatus,
    TraceEntry, TraceSink,
};

use crate::event_thread::EventThread;
use crate::timer::Timer;

type Reaction = dyn Fn(&ExceptionContext) + Send + Sync;

/// Owns the timer and every event thread spawned through it, plus the
/// process-wide exception sink. Teardown order is timer first, then every
/// event thread, then join (§9).
pub struct Environment<C: Clock + 'static = SystemClock> {
    config: RuntimeConfig,
    trace: Arc<dyn TraceSink>,
    timer: Arc<Timer<C>>,
    timer_started: Once,
    threads: Mutex<Vec<Arc<EventThread>>>,
    reactions: Mutex<Vec<Arc<Reaction>>>,
    self_weak: std::sync::Weak<Environment<C>>,
    shut_down: AtomicBool,
}

impl<C: Clock + 'static> Environment<C> {
    pub fn new(config: RuntimeConfig, clock: C, trace: Arc<dyn TraceSink>) -> Arc<Self> {
        let timer = Timer::new(clock, config.max_allowable_time_gap_ms, Arc::clone(&trace), Arc::new(|_| {}));
        Arc::new_cyclic(|weak| Self {
            config,
            trace,
            timer,
            timer_started: Once::new(),
            threads: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
            self_weak: weak.clone(),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    pub fn trace(&self) -> Arc<dyn TraceSink> {
        Arc::clone(&self.trace)
    }

    /// Registers an additional reaction run (after tracing) whenever a
    /// fault reaches the global sink (§7 "Routing policy": "a process-global
    /// exception handler sink which by default appends a trace entry and
    /// optionally saves the trace file", plus any user-registered reaction).
    pub fn register_exception_reaction(&self, reaction: impl Fn(&ExceptionContext) + Send + Sync + 'static) {
        self.reactions.lock().push(Arc::new(reaction));
    }

    /// The closure handed to every `EventThread`/`Timer`/`EventHandler`/
    /// `StateMachine` constructed through this environment as their
    /// `on_fault` sink.
    pub fn on_fault_sink(self: &Arc<Self>) -> Arc<dyn Fn(ExceptionContext) + Send + Sync> {
        let this = self.self_weak.clone();
        Arc::new(move |ctx: ExceptionContext| {
            if let Some(this) = this.upgrade() {
                this.route_fault(ctx);
            }
        })
    }

    fn route_fault(&self, ctx: ExceptionContext) {
        tracing::error!(source = %ctx.source, message = %ctx.message, "exception routed to global sink");
        if self.trace.enabled() {
            self.trace.record(TraceEntry::new(
                ctx.occurred_at_epoch_ms,
                "Exception",
                SmallFields::new().push("source", ctx.source.clone()).push("message", ctx.message.clone()),
            ));
        }
        for reaction in self.reactions.lock().iter() {
            reaction(&ctx);
        }
    }

    /// The timer service, started lazily on first access rather than
    /// eagerly at `new` (§2: "autostarts the timer ... on first use").
    pub fn timer(self: &Arc<Self>) -> Arc<Timer<C>> {
        self.timer_started.call_once(|| self.timer.start());
        Arc::clone(&self.timer)
    }

    /// Spawns and starts a new event thread, tracking it so `shutdown` can
    /// tear it down in order.
    pub fn spawn_event_thread(self: &Arc<Self>, name: impl Into<String>) -> Arc<EventThread> {
        let thread = EventThread::new(name, self.trace(), self.on_fault_sink());
        thread.start();
        self.threads.lock().push(Arc::clone(&thread));
        thread
    }

    /// Tears down the timer, then every tracked event thread, then joins —
    /// the order the source's environment teardown uses (§9 "Global
    /// state"). Idempotent: a second call is a no-op.
    pub fn shutdown(&self, timeout: Duration, poll_interval: Duration) -> TerminationStatus {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return TerminationStatus::Completed;
        }
        let mut overall = self.timer.shutdown(timeout, poll_interval);
        for thread in self.threads.lock().drain(..) {
            let status = thread.shutdown(timeout, poll_interval);
            if status == TerminationStatus::TimedOut {
                overall = TerminationStatus::TimedOut;
            }
        }
        overall
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
