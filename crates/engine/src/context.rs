// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The context type threaded through every entry/exit/transition action and
//! guard (`SPEC_FULL.md` §9 "Actions and guards").
//!
//! Actions close over whatever shared data model they mutate the way a
//! client wires it up (typically an `Arc<parking_lot::Mutex<T>>` captured by
//! the closure); the context itself only carries what the *framework* needs
//! to hand back to the action: the event that triggered this step and a way
//! to enqueue further events without the action needing a handle to its own
//! event thread.

use std::sync::Arc;

use hsm_core::Event;

pub type EnqueueFn = dyn Fn(Event, bool) + Send + Sync;

/// Passed by reference to every registered action and guard closure.
#[derive(Clone)]
pub struct ActionContext {
    event: Event,
    enqueue: Arc<EnqueueFn>,
}

impl ActionContext {
    pub fn new(event: Event, enqueue: Arc<EnqueueFn>) -> Self {
        Self { event, enqueue }
    }

    /// The event currently being processed by this RTC step.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Queues `event` onto the machine's own event thread. `priority` mirrors
    /// the internal run-to-completion delimiter's head-of-queue placement;
    /// user code should essentially always pass `false`.
    pub fn enqueue(&self, event: Event, priority: bool) {
        (self.enqueue)(event, priority)
    }
}
