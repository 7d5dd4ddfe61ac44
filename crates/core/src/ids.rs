// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity types shared across the event, timer, and dispatch layers.
//!
//! [`EventId`] deliberately does *not* use [`crate::id::IdBuf`]/[`crate::define_id`]:
//! trigger matching compares an event's id on every transition evaluated in every
//! RTC step, so it is a bare `u64` rather than a 23-byte string comparison. Every
//! other identity here (threads, event handlers) is long-lived and mostly seen in
//! logs/diagnostics, so it gets the friendlier string-backed id.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity used for trigger matching.
///
/// An `EventId` is assigned once, when a client constructs a logical event
/// (`Event::new(...)`). Copies made via [`crate::event::Event::copy`] retain the
/// original's id so a transition's registered trigger still matches any copy
/// queued later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Allocates a fresh, process-unique event id.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt#{}", self.0)
    }
}

crate::define_id! {
    /// Identity of an event handler (state machine or plain reactive handler)
    /// registered with an event thread.
    pub struct EventHandlerId("hdl-");
}

crate::define_id! {
    /// Identity of a long-running thread (event thread or the timer thread)
    /// tracked by the environment registry.
    pub struct ThreadId("thr-");
}
