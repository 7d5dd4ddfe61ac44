// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The plain reactive event handler: event-id → ordered action list, with
//! no state graph of its own (`SPEC_FULL.md` §2 "Event thread & event
//! handler", §3 "Event handler").
//!
//! [`crate::machine::StateMachine`] shares the run/termination status shape
//! defined here but is not built on top of this type — both independently
//! implement [`crate::event_thread::Dispatch`], matching §3's framing of a
//! state machine as "a composite state that is also an event handler"
//! rather than a handler that happens to own a graph.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use hsm_core::{ActionHandle, ActionList, Event, EventHandlerId, EventId};

use crate::context::ActionContext;
use crate::event_thread::{Dispatch, EventThread};

/// Whether a handler is accepting and acting on events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Stopped,
    Started,
}

/// Two-phase termination status (§3 "Event thread & event handler").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    Ready,
    Terminating,
    Terminated,
}

/// The fixed control events every handler recognizes, each carrying a
/// stable [`EventId`] assigned once at construction (§4.2: trigger matching
/// is by id, so these never collide with a user-defined event).
pub struct ControlEvents {
    pub start: Event,
    pub stop: Event,
    pub terminate: Event,
}

impl ControlEvents {
    fn new(owner: EventHandlerId) -> Self {
        Self {
            start: Event::new("Start").with_routing(owner, owner),
            stop: Event::new("Stop").with_routing(owner, owner),
            terminate: Event::new("Terminate").with_routing(owner, owner),
        }
    }
}

/// A lightweight reactive handler: on each recognized event id, runs its
/// registered action list. Not a state machine — there is no graph, no RTC
/// step, no guards.
pub struct EventHandler {
    id: EventHandlerId,
    name: String,
    thread: Arc<EventThread>,
    self_weak: std::sync::Weak<EventHandler>,
    reactions: Mutex<HashMap<EventId, ActionList<ActionContext>>>,
    run_status: Mutex<RunStatus>,
    termination_status: Mutex<TerminationStatus>,
    control: ControlEvents,
    on_fault: Arc<dyn Fn(hsm_core::ExceptionContext) + Send + Sync>,
}

impl EventHandler {
    pub fn new(
        name: impl Into<String>,
        thread: Arc<EventThread>,
        on_fault: Arc<dyn Fn(hsm_core::ExceptionContext) + Send + Sync>,
    ) -> Arc<Self> {
        let id = EventHandlerId::new();
        let handler = Arc::new_cyclic(|weak| Self {
            id,
            name: name.into(),
            thread: Arc::clone(&thread),
            self_weak: weak.clone(),
            reactions: Mutex::new(HashMap::new()),
            run_status: Mutex::new(RunStatus::Stopped),
            termination_status: Mutex::new(TerminationStatus::Ready),
            control: ControlEvents::new(id),
            on_fault,
        });
        thread.attach(handler.clone());
        handler
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

    /// Registers `action` to run, in order, whenever an event with id
    /// `event_id` is handled while the handler is started.
    pub fn add_reaction(
        &self,
        event_id: EventId,
        action: impl Fn(&ActionContext) -> Result<(), hsm_core::DispatchError> + Send + Sync + 'static,
    ) -> ActionHandle {
        self.reactions
            .lock()
            .entry(event_id)
            .or_insert_with(ActionList::new)
            .add(action)
    }

    pub fn remove_reaction(&self, event_id: EventId, handle: ActionHandle) -> bool {
        self.reactions
            .lock()
            .get_mut(&event_id)
            .map(|list| list.remove(handle))
            .unwrap_or(false)
    }

    pub fn has_event(&self, event_id: EventId) -> bool {
        self.reactions.lock().contains_key(&event_id)
    }

    /// Public admission point: rejects everything except `Terminate` once
    /// termination has begun (§3 "Enqueues rejected once termination-status
    /// ≠ ready, except terminate event itself").
    pub fn queue_event(&self, event: Event, priority: bool) {
        let terminating = *self.termination_status.lock() != TerminationStatus::Ready;
        if terminating && event.id() != self.control.terminate.id() {
            return;
        }
        self.thread.queue_event(event, priority);
    }

    pub fn start(&self) {
        self.queue_event(self.control.start.clone(), false);
    }

    pub fn stop(&self) {
        self.queue_event(self.control.stop.clone(), false);
    }

    pub fn terminate(&self) {
        *self.termination_status.lock() = TerminationStatus::Terminating;
        self.queue_event(self.control.terminate.clone(), false);
    }

    /// An enqueue closure actions can call to post further events back to
    /// this handler's own thread (§9 "Actions and guards").
    fn enqueue_fn(&self) -> Arc<crate::context::EnqueueFn> {
        let this = self.self_weak.clone();
        Arc::new(move |event, priority| {
            if let Some(this) = this.upgrade() {
                this.queue_event(event, priority);
            }
        })
    }
}

impl Dispatch for EventHandler {
    fn id(&self) -> EventHandlerId {
        self.id
    }

    fn handle_event(&self, event: Event) {
        if event.id() == self.control.start.id() {
            *self.run_status.lock() = RunStatus::Started;
            return;
        }
        if event.id() == self.control.stop.id() {
            *self.run_status.lock() = RunStatus::Stopped;
            return;
        }
        if event.id() == self.control.terminate.id() {
            *self.termination_status.lock() = TerminationStatus::Terminated;
            self.thread.detach(self.id);
            return;
        }
        if *self.run_status.lock() != RunStatus::Started {
            return;
        }
        let reactions = self.reactions.lock();
        let Some(actions) = reactions.get(&event.id()) else {
            return;
        };
        let ctx = ActionContext::new(event.clone(), self.enqueue_fn());
        let on_fault = &self.on_fault;
        actions.execute(&ctx, &mut |f| {
            tracing::error!(handler = %self.name, source = %f.source, message = %f.message, "exception raised");
            on_fault(f);
        });
    }

    fn is_terminated(&self) -> bool {
        *self.termination_status.lock() == TerminationStatus::Terminated
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
