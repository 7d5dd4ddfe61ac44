// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events: the unit of dispatch delivered to event handlers and state machines.

use crate::ids::{EventHandlerId, EventId};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Whether a queued event is owned by the queue (destroyed once handled) or
/// retained by the caller. Modeled as an enum rather than a bare bool so drop
/// semantics at the call site are explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The queue owns this event; it is dropped once its terminal handler returns.
    DeleteAfterHandling,
    /// The caller retains ownership; the queue never drops it.
    RetainedByCaller,
}

impl Ownership {
    pub fn delete_after_handling(self) -> bool {
        matches!(self, Ownership::DeleteAfterHandling)
    }
}

/// A type-erased event payload. Holds an arbitrary `Send` value; readers
/// downcast to the type they expect and get `None` on mismatch rather than a
/// panic.
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// Scheduling fields shared with the timer subsystem (see `hsm_engine::timer`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduling {
    pub delay_ms: u64,
    pub repeat_ms: u64,
    pub next_execution_time_ms: u64,
}

/// An event: the unit of dispatch.
///
/// `id` is assigned once per *logical* event (see [`EventId`]'s doc comment)
/// and is preserved by [`Event::copy`] so a transition's registered trigger
/// still matches any copy queued later.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    name: String,
    source: Option<EventHandlerId>,
    destination: Option<EventHandlerId>,
    ownership: Ownership,
    payload: Option<Payload>,
    scheduling: Scheduling,
}

impl Event {
    /// Constructs a new logical event with a fresh [`EventId`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            source: None,
            destination: None,
            ownership: Ownership::RetainedByCaller,
            payload: None,
            scheduling: Scheduling::default(),
        }
    }

    pub fn with_routing(mut self, source: EventHandlerId, destination: EventHandlerId) -> Self {
        self.source = Some(source);
        self.destination = Some(destination);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<EventHandlerId> {
        self.source
    }

    pub fn destination(&self) -> Option<EventHandlerId> {
        self.destination
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn delete_after_handling(&self) -> bool {
        self.ownership.delete_after_handling()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    pub fn set_routing(&mut self, source: EventHandlerId, destination: EventHandlerId) {
        self.source = Some(source);
        self.destination = Some(destination);
    }

    pub fn set_scheduling(&mut self, scheduling: Scheduling) {
        self.scheduling = scheduling;
    }

    /// Copies this event, retaining its id so trigger matching still applies.
    /// The copy's ownership is reset to whatever the caller asks for here
    /// (the original's ownership flag is not itself meaningful to copy).
    pub fn copy(&self, ownership: Ownership) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            source: self.source,
            destination: self.destination,
            ownership,
            payload: self.payload.clone(),
            scheduling: self.scheduling,
        }
    }

    pub fn copy_with_destination(&self, ownership: Ownership, destination: EventHandlerId) -> Self {
        let mut copy = self.copy(ownership);
        copy.destination = Some(destination);
        copy
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
