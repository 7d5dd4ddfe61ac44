// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event thread: an unbounded FIFO plus the handlers attached to it
//! (`SPEC_FULL.md` §4.4).
//!
//! `queue_event` only ever pushes; a handler's own `queue_event` (on
//! [`crate::handler::EventHandler`] or [`crate::machine::StateMachine`]) is
//! what gates on termination status. This mirrors the source's separation
//! between the thread's FIFO (dumb) and each handler's admission control.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hsm_core::sync::{Signal, TerminationStatus, Thread, ThreadPriority};
use hsm_core::{Event, EventHandlerId, ExceptionContext, SmallFields, ThreadId, TraceEntry, TraceSink};

/// Implemented by anything an event thread can route an [`Event`] to: a
/// plain reactive [`crate::handler::EventHandler`] or a
/// [`crate::machine::StateMachine`].
pub trait Dispatch: Send + Sync {
    fn id(&self) -> EventHandlerId;

    /// Handles one event. Any panic raised here is caught by the event
    /// thread and routed to the global exception sink (§4.4 step 2);
    /// implementors do not need their own panic boundary.
    fn handle_event(&self, event: Event);

    /// Whether this handler has completed its two-phase termination and
    /// should no longer be considered by `all_handlers_terminated`.
    fn is_terminated(&self) -> bool;

    /// Called after an event destined for this handler is dequeued and the
    /// FIFO is observed empty. The default does nothing; `StateMachine`
    /// overrides it to reset its consecutive-loop counter (§9 "Open
    /// questions": "reset to zero exactly when a dequeue attempt finds the
    /// queue empty for this handler").
    fn on_idle(&self) {}
}

/// An event thread: FIFO of events plus the handlers attached to it
/// (§3 "Event thread").
pub struct EventThread {
    id: ThreadId,
    name: String,
    queue: Mutex<VecDeque<Event>>,
    handlers: Mutex<HashMap<EventHandlerId, Arc<dyn Dispatch>>>,
    signal: Signal,
    terminating: AtomicBool,
    thread: Mutex<Option<Thread>>,
    trace: Arc<dyn TraceSink>,
    on_fault: Arc<dyn Fn(ExceptionContext) + Send + Sync>,
}

impl EventThread {
    pub fn new(
        name: impl Into<String>,
        trace: Arc<dyn TraceSink>,
        on_fault: Arc<dyn Fn(ExceptionContext) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ThreadId::new(),
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            handlers: Mutex::new(HashMap::new()),
            signal: Signal::new(),
            terminating: AtomicBool::new(false),
            thread: Mutex::new(None),
            trace,
            on_fault,
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns the OS thread backing this event thread's dispatch loop.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let thread = Thread::spawn(self.name.clone(), ThreadPriority::Normal, move |token| {
            this.run(token)
        });
        *self.thread.lock() = Some(thread);
    }

    pub fn attach(&self, handler: Arc<dyn Dispatch>) {
        self.handlers.lock().insert(handler.id(), handler);
    }

    pub fn detach(&self, id: EventHandlerId) {
        self.handlers.lock().remove(&id);
    }

    /// Pushes `event` to the back of the FIFO (or the front, for the
    /// internal run-to-completion delimiter), then signals the dispatch
    /// loop (§4.4).
    pub fn queue_event(&self, event: Event, priority: bool) {
        if self.trace.enabled() {
            self.trace.record(TraceEntry::new(
                0,
                "EventQueued",
                SmallFields::new()
                    .push("name", event.name().to_string())
                    .push("priority", priority.to_string()),
            ));
        }
        let mut queue = self.queue.lock();
        if priority {
            queue.push_front(event);
        } else {
            queue.push_back(event);
        }
        drop(queue);
        self.signal.post();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    fn all_handlers_terminated(&self) -> bool {
        self.handlers.lock().values().all(|h| h.is_terminated())
    }

    fn run(self: Arc<Self>, token: hsm_core::sync::thread::StopToken) {
        loop {
            if token.should_stop() {
                break;
            }
            self.signal.wait_timeout(Duration::from_millis(200));
            loop {
                let event = self.queue.lock().pop_front();
                let Some(event) = event else { break };
                self.dispatch_one(event);
            }
            if self.terminating.load(Ordering::Acquire) && self.all_handlers_terminated() {
                break;
            }
        }
    }

    /// Looks up the event's destination, calls its `handle_event` under a
    /// panic boundary, and on the way out tells the handler whether the
    /// queue just went idle (§4.4 step 2; §9 loop-counter decision).
    fn dispatch_one(&self, event: Event) {
        let Some(destination) = event.destination() else {
            return;
        };
        let handler = self.handlers.lock().get(&destination).cloned();
        let Some(handler) = handler else {
            return;
        };
        let name = event.name().to_string();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.handle_event(event);
        }));
        if result.is_err() {
            tracing::error!(thread = %self.name, handler = %destination, event = %name, "handler panicked while dispatching");
            (self.on_fault)(ExceptionContext::new(
                self.name.clone(),
                format!("handler {destination} panicked while dispatching {name}"),
            ));
        }
        if self.queue.lock().is_empty() {
            handler.on_idle();
        }
    }

    /// Requests shutdown: marks terminating, wakes the loop, and joins the
    /// OS thread with a bound (§5 "Cancellation & timeouts").
    pub fn shutdown(&self, timeout: Duration, poll_interval: Duration) -> TerminationStatus {
        self.terminating.store(true, Ordering::Release);
        self.signal.post();
        let thread = self.thread.lock().take();
        match thread {
            Some(t) => {
                t.request_stop();
                t.join_with_timeout(timeout, poll_interval)
            }
            None => TerminationStatus::Completed,
        }
    }
}

#[cfg(test)]
#[path = "event_thread_tests.rs"]
mod tests;
