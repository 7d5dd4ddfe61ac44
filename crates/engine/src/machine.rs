// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state machine: a composite state that is also an event handler
//! (`SPEC_FULL.md` §3 "State machine", §4.5 "State-machine RTC step", §4.6
//! "Lifecycle control").
//!
//! A nested sub-machine (§4.6: "a state machine used as a substate") is not
//! modeled as a second `Arc<StateMachine>` forwarding control events to a
//! parent — the composite-state/region nesting already lives inside one
//! [`Graph`], and [`crate::dispatch::process_event`] already recurses into
//! nested composites. So "nesting" here is just ordinary topology: one
//! `StateMachine` owns the whole graph for a top-level machine, and what the
//! source calls a sub-machine is simply a composite state within it. This
//! sidesteps the forwarding chain entirely rather than reimplementing it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use hsm_core::{ActionHandle, ActionList, Event, EventHandlerId, ExceptionContext, LifecycleError, RuntimeConfig};

use crate::context::ActionContext;
use crate::dispatch;
use crate::event_thread::{Dispatch, EventThread};
use crate::graph::{Graph, StateHandle};
use crate::handler::{RunStatus, TerminationStatus};

/// The fixed control events a state machine recognizes in addition to the
/// events its topology triggers on (§4.6).
pub struct MachineControlEvents {
    pub start: Event,
    pub stop: Event,
    pub reset: Event,
    pub terminate: Event,
    pub force_evaluation: Event,
    run_to_completion: Event,
}

impl MachineControlEvents {
    fn new(owner: EventHandlerId) -> Self {
        Self {
            start: Event::new("Start").with_routing(owner, owner),
            stop: Event::new("Stop").with_routing(owner, owner),
            reset: Event::new("Reset").with_routing(owner, owner),
            terminate: Event::new("Terminate").with_routing(owner, owner),
            force_evaluation: Event::new("ForceEvaluation").with_routing(owner, owner),
            run_to_completion: Event::new("RunToCompletion").with_routing(owner, owner),
        }
    }
}

/// A hierarchical, concurrent, event-driven state machine: a composite-state
/// graph plus the event-handler machinery (run/termination status, control
/// events) needed to receive events off an [`EventThread`] (§3 "State
/// machine").
pub struct StateMachine {
    id: EventHandlerId,
    name: String,
    graph: Mutex<Graph>,
    root: StateHandle,
    thread: Arc<EventThread>,
    self_weak: Weak<StateMachine>,
    run_status: Mutex<RunStatus>,
    termination_status: Mutex<TerminationStatus>,
    control: MachineControlEvents,
    consecutive_loop_count: AtomicU32,
    loop_limit: u32,
    termination_timeout_ms: u64,
    termination_poll_interval_ms: u64,
    exception_actions: Mutex<ActionList<ExceptionContext>>,
    state_change_actions: Mutex<ActionList<StateHandle>>,
    on_fault: Arc<dyn Fn(ExceptionContext) + Send + Sync>,
}

impl StateMachine {
    /// Builds a state machine over an already-constructed `graph`/`root`
    /// (topology is built once, bottom-up, before `start_state_machine` is
    /// ever queued — §4.1). Attaches itself to `thread` immediately so
    /// `queue_event` calls work right away, even though nothing is actually
    /// dispatched until the dispatch loop is started and `Start` is queued.
    pub fn new(
        name: impl Into<String>,
        thread: Arc<EventThread>,
        graph: Graph,
        root: StateHandle,
        config: &RuntimeConfig,
        on_fault: Arc<dyn Fn(ExceptionContext) + Send + Sync>,
    ) -> Arc<Self> {
        let id = EventHandlerId::new();
        let machine = Arc::new_cyclic(|weak| Self {
            id,
            name: name.into(),
            graph: Mutex::new(graph),
            root,
            thread: Arc::clone(&thread),
            self_weak: weak.clone(),
            run_status: Mutex::new(RunStatus::Stopped),
            termination_status: Mutex::new(TerminationStatus::Ready),
            control: MachineControlEvents::new(id),
            consecutive_loop_count: AtomicU32::new(0),
            loop_limit: config.consecutive_loop_limit,
            termination_timeout_ms: config.termination_timeout_ms,
            termination_poll_interval_ms: config.termination_poll_interval_ms,
            exception_actions: Mutex::new(ActionList::new()),
            state_change_actions: Mutex::new(ActionList::new()),
            on_fault,
        });
        thread.attach(machine.clone());
        machine
    }

    pub fn id(&self) -> EventHandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_status(&self) -> RunStatus {
        *self.run_status.lock()
    }

    pub fn termination_status(&self) -> TerminationStatus {
        *self.termination_status.lock()
    }

    /// Direct access to the underlying graph, for attaching entry/exit
    /// actions, transition guards/actions, and triggers (§6: "guards/actions
    /// lists mutable pre-start").
    pub fn graph(&self) -> parking_lot::MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    pub fn root(&self) -> StateHandle {
        self.root
    }

    pub fn is_active(&self, state: StateHandle) -> bool {
        self.graph.lock().is_active(state)
    }

    pub fn is_in_state(&self, state: StateHandle) -> bool {
        self.graph.lock().is_in_state(state)
    }

    /// Registers a reaction to any fault raised while dispatching this
    /// machine's own events (§7 "Routing policy": local exception-action
    /// list, run before the process-global sink).
    pub fn add_exception_action(
        &self,
        action: impl Fn(&ExceptionContext) -> Result<(), hsm_core::DispatchError> + Send + Sync + 'static,
    ) -> ActionHandle {
        self.exception_actions.lock().add(action)
    }

    pub fn remove_exception_action(&self, handle: ActionHandle) -> bool {
        self.exception_actions.lock().remove(handle)
    }

    /// Registers an action run whenever any state in this machine is
    /// entered (§4.5 "Entry/exit actions": "notifies the containing
    /// machine's state-change-action list").
    pub fn add_state_change_action(
        &self,
        action: impl Fn(&StateHandle) -> Result<(), hsm_core::DispatchError> + Send + Sync + 'static,
    ) -> ActionHandle {
        self.state_change_actions.lock().add(action)
    }

    pub fn remove_state_change_action(&self, handle: ActionHandle) -> bool {
        self.state_change_actions.lock().remove(handle)
    }

    pub fn start_state_machine(&self) {
        self.queue_event(self.control.start.clone(), false);
    }

    pub fn stop_state_machine(&self) {
        self.queue_event(self.control.stop.clone(), false);
    }

    pub fn reset_state_machine(&self) {
        self.queue_event(self.control.reset.clone(), false);
    }

    /// Re-evaluates pending completion transitions (transitions with no
    /// trigger, which fire on any event) without waiting for a real event to
    /// arrive. Implemented as queueing a dedicated marker event rather than a
    /// special dispatch path, since a triggerless transition already matches
    /// any event id (§4.2).
    pub fn force_state_machine_evaluation(&self) {
        self.queue_event(self.control.force_evaluation.clone(), false);
    }

    /// Queues `Terminate`. If `wait` is true, blocks the caller (short
    /// sleeps, per §4.6/§5 "Cancellation & timeouts") until termination
    /// completes or the configured timeout elapses.
    pub fn terminate(&self, wait: bool) -> Result<(), LifecycleError> {
        *self.termination_status.lock() = TerminationStatus::Terminating;
        self.queue_event(self.control.terminate.clone(), false);
        if !wait {
            return Ok(());
        }
        let timeout = Duration::from_millis(self.termination_timeout_ms);
        let poll = Duration::from_millis(self.termination_poll_interval_ms);
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_terminated() {
                return Ok(());
            }
            std::thread::sleep(poll);
        }
        if self.is_terminated() {
            Ok(())
        } else {
            Err(LifecycleError::TerminationTimeout {
                name: self.name.clone(),
                timeout_ms: self.termination_timeout_ms,
            })
        }
    }

    /// Public admission point: rejects everything except `Terminate` once
    /// termination-status ≠ ready (§3 "Event handler").
    pub fn queue_event(&self, event: Event, priority: bool) {
        let terminating = *self.termination_status.lock() != TerminationStatus::Ready;
        if terminating && event.id() != self.control.terminate.id() {
            return;
        }
        self.thread.queue_event(event, priority);
    }

    fn enqueue_fn(&self) -> Arc<crate::context::EnqueueFn> {
        let this = self.self_weak.clone();
        Arc::new(move |event, priority| {
            if let Some(this) = this.upgrade() {
                this.queue_event(event, priority);
            }
        })
    }

    /// Delivers `context` first to this machine's local exception-action
    /// list, then unconditionally to the process-global sink — nothing is
    /// swallowed silently (§7 "Routing policy").
    fn raise_fault(&self, context: ExceptionContext) {
        tracing::error!(machine = %self.name, source = %context.source, message = %context.message, "exception raised");
        let on_fault = &self.on_fault;
        self.exception_actions.lock().execute(&context, &mut |nested| on_fault(nested));
        (self.on_fault)(context);
    }

    fn notify_state_change(&self, state: StateHandle) {
        let state_change_actions = self.state_change_actions.lock();
        state_change_actions.execute(&state, &mut |f| self.raise_fault(f));
    }

    /// Enters the root composite state if it is not already active. Called
    /// both from `Start` handling and, idempotently, at the top of every RTC
    /// step (§4.5 step 2: "if not already active, enter the root composite
    /// state" — a client that queues events without ever queueing `Start`
    /// still gets a working machine).
    fn activate(&self, event: &Event) {
        if self.graph.lock().is_active(self.root) {
            return;
        }
        let ctx = ActionContext::new(event.clone(), self.enqueue_fn());
        let mut faults = Vec::new();
        let mut changes = Vec::new();
        {
            let mut graph = self.graph.lock();
            if graph.is_active(self.root) {
                return;
            }
            dispatch::enter_state(&mut graph, self.root, false, &ctx, &mut |f| faults.push(f), &mut |s| {
                changes.push(s)
            });
        }
        for f in faults {
            self.raise_fault(f);
        }
        for s in changes {
            self.notify_state_change(s);
        }
    }

    fn handle_reset(&self) {
        self.graph.lock().reset_all();
        self.consecutive_loop_count.store(0, Ordering::Relaxed);
    }

    /// The RTC step proper (§4.5 steps 2-4): activate if needed, bump the
    /// consecutive-loop counter, dispatch, and — if the event was handled —
    /// queue the internal `RunToCompletion` delimiter so a burst of
    /// self-queued events is recognized as one ongoing RTC chain for
    /// loop-detection purposes.
    fn run_rtc_step(&self, event: Event) {
        let count = self.consecutive_loop_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count > self.loop_limit {
            self.raise_fault(ExceptionContext::new(
                self.name.clone(),
                format!("exceeded consecutive-loop limit of {}; machine is ill-formed or livelocking", self.loop_limit),
            ));
        }

        self.activate(&event);

        let ctx = ActionContext::new(event.clone(), self.enqueue_fn());
        let mut faults = Vec::new();
        let mut changes = Vec::new();
        let handled = {
            let mut graph = self.graph.lock();
            dispatch::process_event(&mut graph, self.root, event.id(), &ctx, &mut |f| faults.push(f), &mut |s| {
                changes.push(s)
            })
        };
        for f in faults {
            self.raise_fault(f);
        }
        for s in changes {
            self.notify_state_change(s);
        }
        if handled {
            self.thread.queue_event(self.control.run_to_completion.clone(), true);
        }
    }
}

impl Dispatch for StateMachine {
    fn id(&self) -> EventHandlerId {
        self.id
    }

    fn handle_event(&self, event: Event) {
        let ev_id = event.id();
        if ev_id == self.control.terminate.id() {
            *self.termination_status.lock() = TerminationStatus::Terminated;
            self.thread.detach(self.id);
            return;
        }
        if ev_id == self.control.stop.id() {
            *self.run_status.lock() = RunStatus::Stopped;
            return;
        }
        if ev_id == self.control.reset.id() {
            self.handle_reset();
            return;
        }
        if ev_id == self.control.run_to_completion.id() {
            return;
        }
        if ev_id == self.control.start.id() {
            *self.run_status.lock() = RunStatus::Started;
            self.activate(&event);
            return;
        }
        if *self.run_status.lock() != RunStatus::Started {
            return;
        }
        self.run_rtc_step(event);
    }

    fn is_terminated(&self) -> bool {
        *self.termination_status.lock() == TerminationStatus::Terminated
    }

    /// Resets the consecutive-loop counter when a dequeue attempt finds the
    /// queue empty for this handler (§9 "Open questions": "reset to zero
    /// exactly when a dequeue attempt finds the queue empty").
    fn on_idle(&self) {
        self.consecutive_loop_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
