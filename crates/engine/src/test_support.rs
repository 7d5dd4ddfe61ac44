// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`. The
//! `test-support` feature path compiles this outside `cfg(test)`, so the
//! crate's `cfg_attr(test, allow(...))` lints don't reach it; allow them
//! here directly since every topology built below is a fixed literal shape.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use hsm_core::{Event, EventId, ExceptionContext, Ownership};

use crate::context::ActionContext;
use crate::dispatch;
use crate::graph::{Graph, RegionHandle, StateHandle, TransitionKind};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for driving small topologies with random event
/// sequences.
pub mod strategies {
    use proptest::prelude::*;

    /// A sequence of small integers, each picking one of a handful of events
    /// to fire against a fixed small topology.
    pub fn arb_event_sequence(event_count: u8, max_len: usize) -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0..event_count, 0..=max_len)
    }
}

/// A no-op action context: no trigger of interest, nothing enqueued.
pub fn noop_context() -> ActionContext {
    ActionContext::new(Event::new("Noop"), Arc::new(|_event, _priority| {}))
}

/// Fires `event_id` at `composite`, discarding faults and state-change
/// notifications. Panics are not expected from the small fixed topologies
/// built here, so dropping faults silently is acceptable in tests that only
/// care about the resulting active configuration.
pub fn fire(graph: &mut Graph, composite: StateHandle, event_id: EventId) -> bool {
    let ctx = noop_context();
    dispatch::process_event(graph, composite, event_id, &ctx, &mut |_fault: ExceptionContext| {}, &mut |_state| {})
}

/// Two orthogonal regions, each a two-state toggle, inside one composite.
/// Region A toggles `a1 <-> a2` on `toggle_a`; region B toggles `b1 <-> b2`
/// on `toggle_b`. Used to exercise "at most one active substate per region"
/// and LCA scoping under random interleavings of the two events.
pub struct TwoRegionTopology {
    pub graph: Graph,
    pub composite: StateHandle,
    pub region_a: RegionHandle,
    pub region_b: RegionHandle,
    pub a1: StateHandle,
    pub a2: StateHandle,
    pub b1: StateHandle,
    pub b2: StateHandle,
    pub toggle_a: EventId,
    pub toggle_b: EventId,
}

pub fn two_region_topology() -> TwoRegionTopology {
    let mut graph = Graph::new();
    let composite = graph.add_composite_state("Composite");
    let region_a = graph.add_region(composite, "RegionA").expect("composite has a region slot");
    let region_b = graph.add_region(composite, "RegionB").expect("composite has a region slot");

    let a1 = graph.add_state("A1");
    let a2 = graph.add_state("A2");
    graph.attach_substate(region_a, a1).expect("a1 attaches to region a");
    graph.attach_substate(region_a, a2).expect("a2 attaches to region a");

    let b1 = graph.add_state("B1");
    let b2 = graph.add_state("B2");
    graph.attach_substate(region_b, b1).expect("b1 attaches to region b");
    graph.attach_substate(region_b, b2).expect("b2 attaches to region b");

    let toggle_a = Event::new("ToggleA").id();
    let toggle_b = Event::new("ToggleB").id();

    let a1_to_a2 = graph.add_transition("a1-a2", a1, a2, TransitionKind::External);
    graph.add_trigger(a1_to_a2, toggle_a);
    let a2_to_a1 = graph.add_transition("a2-a1", a2, a1, TransitionKind::External);
    graph.add_trigger(a2_to_a1, toggle_a);

    let b1_to_b2 = graph.add_transition("b1-b2", b1, b2, TransitionKind::External);
    graph.add_trigger(b1_to_b2, toggle_b);
    let b2_to_b1 = graph.add_transition("b2-b1", b2, b1, TransitionKind::External);
    graph.add_trigger(b2_to_b1, toggle_b);

    let ctx = noop_context();
    dispatch::enter_state(&mut graph, composite, false, &ctx, &mut |_f| {}, &mut |_s| {});

    TwoRegionTopology {
        graph,
        composite,
        region_a,
        region_b,
        a1,
        a2,
        b1,
        b2,
        toggle_a,
        toggle_b,
    }
}

impl TwoRegionTopology {
    /// Every state that is active across both regions, for invariant checks.
    pub fn active_states(&self) -> Vec<StateHandle> {
        [self.composite, self.a1, self.a2, self.b1, self.b2]
            .into_iter()
            .filter(|&s| self.graph.is_active(s))
            .collect()
    }

    /// Number of simultaneously active substates in `region` — must never
    /// exceed 1.
    pub fn active_count(&self, region: RegionHandle) -> usize {
        self.graph.region(region).substates.iter().filter(|&&s| self.graph.is_active(s)).count()
    }

    pub fn fire_index(&mut self, index: u8) -> bool {
        let event_id = if index % 2 == 0 { self.toggle_a } else { self.toggle_b };
        let composite = self.composite;
        fire(&mut self.graph, composite, event_id)
    }
}

/// A linear three-state chain `s1 -> s2 -> s3 -> s1`, all on the same
/// trigger, for simple end-to-end dispatch and RTC tests.
pub struct LinearTopology {
    pub graph: Graph,
    pub composite: StateHandle,
    pub region: RegionHandle,
    pub s1: StateHandle,
    pub s2: StateHandle,
    pub s3: StateHandle,
    pub advance: EventId,
}

pub fn linear_topology() -> LinearTopology {
    let mut graph = Graph::new();
    let composite = graph.add_composite_state("Composite");
    let region = graph.add_region(composite, "Region").expect("composite has a region slot");

    let s1 = graph.add_state("S1");
    let s2 = graph.add_state("S2");
    let s3 = graph.add_state("S3");
    graph.attach_substate(region, s1).expect("s1 attaches");
    graph.attach_substate(region, s2).expect("s2 attaches");
    graph.attach_substate(region, s3).expect("s3 attaches");

    let advance = Event::new("Advance").id();
    let t1 = graph.add_transition("s1-s2", s1, s2, TransitionKind::External);
    graph.add_trigger(t1, advance);
    let t2 = graph.add_transition("s2-s3", s2, s3, TransitionKind::External);
    graph.add_trigger(t2, advance);
    let t3 = graph.add_transition("s3-s1", s3, s1, TransitionKind::External);
    graph.add_trigger(t3, advance);

    let ctx = noop_context();
    dispatch::enter_state(&mut graph, composite, false, &ctx, &mut |_f| {}, &mut |_s| {});

    LinearTopology {
        graph,
        composite,
        region,
        s1,
        s2,
        s3,
        advance,
    }
}

/// An event copied for queueing with no particular ownership requirements.
pub fn event_copy(event: &Event) -> Event {
    event.copy(Ownership::RetainedByCaller)
}
