// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use hsm_core::{Event, EventId};

use super::*;
use crate::graph::TransitionKind;

fn no_op_context(_event_id: EventId) -> (Event, ActionContext) {
    let event = Event::new("Ev");
    let ctx = ActionContext::new(event.clone(), Arc::new(|_, _| {}));
    (event, ctx)
}

fn assert_no_faults(faults: &[hsm_core::ExceptionContext]) {
    assert!(faults.is_empty(), "unexpected faults: {faults:?}");
}

#[test]
fn linear_transitions_cycle_through_states() {
    let mut graph = Graph::new();
    let s1 = graph.add_state("S1");
    let s2 = graph.add_state("S2");
    let s3 = graph.add_state("S3");

    let e1 = Event::new("E1");
    let e2 = Event::new("E2");

    let t_s1_s2 = graph.add_transition("t1", s1, s2, TransitionKind::External);
    graph.add_trigger(t_s1_s2, e1.id());
    let t_s2_s3 = graph.add_transition("t2", s2, s3, TransitionKind::External);
    graph.add_trigger(t_s2_s3, e2.id());
    let t_s3_s2 = graph.add_transition("t3", s3, s2, TransitionKind::External);
    graph.add_trigger(t_s3_s2, e1.id());

    let mut faults = Vec::new();
    let (_, ctx) = no_op_context(e1.id());

    enter_state(&mut graph, s1, false, &ctx, &mut |f| faults.push(f), &mut |_| {});
    assert!(graph.is_active(s1));

    // s1 is a leaf with no regions, so `process_event` falls straight through
    // to its own outgoing transitions.
    assert!(try_fire(&mut graph, s1, e1.id(), &ctx, &mut faults));
    assert!(!graph.is_active(s1));
    assert!(graph.is_active(s2));

    assert!(try_fire(&mut graph, s2, e2.id(), &ctx, &mut faults));
    assert!(graph.is_active(s3));

    assert!(try_fire(&mut graph, s3, e1.id(), &ctx, &mut faults));
    assert!(graph.is_active(s2));

    assert_no_faults(&faults);
}

fn try_fire(
    graph: &mut Graph,
    state: StateHandle,
    event_id: EventId,
    ctx: &ActionContext,
    faults: &mut Vec<hsm_core::ExceptionContext>,
) -> bool {
    process_event(graph, state, event_id, ctx, &mut |f| faults.push(f), &mut |_| {})
}

#[test]
fn deep_history_restores_the_previously_active_leaf() {
    let mut graph = Graph::new();

    let root = graph.add_composite_state("Root");
    let root_region = graph.add_region(root, "RootRegion").unwrap();

    let s1 = graph.add_composite_state("S1");
    let s2 = graph.add_state("S2");
    graph.attach_substate(root_region, s1).unwrap();
    graph.attach_substate(root_region, s2).unwrap();

    let s1_region = graph.add_region(s1, "S1Region").unwrap();
    let s1_1 = graph.add_state("S1_1");
    let h = graph.add_pseudostate(
        "H",
        crate::graph::StateKind::DeepHistory {
            default: Some(s1_1),
        },
    );
    let s1_2 = graph.add_composite_state("S1_2");
    graph.attach_substate(s1_region, h).unwrap();
    graph.attach_substate(s1_region, s1_1).unwrap();
    graph.attach_substate(s1_region, s1_2).unwrap();

    let s1_2_region = graph.add_region(s1_2, "S1_2Region").unwrap();
    let s1_2_1 = graph.add_state("S1_2_1");
    let s1_2_2 = graph.add_state("S1_2_2");
    graph.attach_substate(s1_2_region, s1_2_1).unwrap();
    graph.attach_substate(s1_2_region, s1_2_2).unwrap();

    let e1 = Event::new("E1");
    let e3 = Event::new("E3");
    let e5 = Event::new("E5");
    let e6 = Event::new("E6");

    let t1 = graph.add_transition("t1", s1_1, s1_2_1, TransitionKind::External);
    graph.add_trigger(t1, e1.id());
    let t3 = graph.add_transition("t3", s1_2_1, s1_2_2, TransitionKind::External);
    graph.add_trigger(t3, e3.id());
    let t5 = graph.add_transition("t5", s1, s2, TransitionKind::External);
    graph.add_trigger(t5, e5.id());
    let t6 = graph.add_transition("t6", s2, s1, TransitionKind::External);
    graph.add_trigger(t6, e6.id());

    let mut faults = Vec::new();
    let (_, ctx) = no_op_context(e1.id());

    enter_state(&mut graph, root, false, &ctx, &mut |f| faults.push(f), &mut |_| {});
    assert!(graph.is_active(s1_1));

    assert!(try_fire(&mut graph, s1_1, e1.id(), &ctx, &mut faults));
    assert!(graph.is_active(s1_2_1));

    assert!(try_fire(&mut graph, s1_2_1, e3.id(), &ctx, &mut faults));
    assert!(graph.is_active(s1_2_2));

    assert!(try_fire(&mut graph, s1, e5.id(), &ctx, &mut faults));
    assert!(graph.is_active(s2));
    assert!(!graph.is_active(s1));

    assert!(try_fire(&mut graph, s2, e6.id(), &ctx, &mut faults));
    assert!(graph.is_active(s1_2_2), "deep history should restore S1_2_2");
    assert!(graph.is_active(s1_2));
    assert!(graph.is_active(s1));

    assert_no_faults(&faults);
}

#[test]
fn fork_join_waits_for_every_incoming_before_firing_outgoing() {
    let mut graph = Graph::new();

    let root = graph.add_composite_state("Root");
    let region_a = graph.add_region(root, "A").unwrap();
    let region_b = graph.add_region(root, "B").unwrap();

    let a1 = graph.add_state("A1");
    let a2 = graph.add_state("A2");
    graph.attach_substate(region_a, a1).unwrap();
    graph.attach_substate(region_a, a2).unwrap();

    let b1 = graph.add_state("B1");
    let b2 = graph.add_state("B2");
    graph.attach_substate(region_b, b1).unwrap();
    graph.attach_substate(region_b, b2).unwrap();

    let join = graph.add_pseudostate(
        "J",
        crate::graph::StateKind::ForkJoin {
            incoming: Vec::new(),
            completed: Default::default(),
        },
    );
    // The join pseudostate must sit in one of the regions to have a parent.
    graph.attach_substate(region_a, join).unwrap();

    let ev_a1 = Event::new("EvA1");
    let ev_b1 = Event::new("EvB1");

    let t_a1_j = graph.add_transition("a1->j", a1, join, TransitionKind::External);
    graph.add_trigger(t_a1_j, ev_a1.id());
    let t_b1_j = graph.add_transition("b1->j", b1, join, TransitionKind::External);
    graph.add_trigger(t_b1_j, ev_b1.id());
    let _t_j_a2 = graph.add_transition("j->a2", join, a2, TransitionKind::External);
    let _t_j_b2 = graph.add_transition("j->b2", join, b2, TransitionKind::External);

    let mut faults = Vec::new();
    let (_, ctx) = no_op_context(ev_a1.id());

    enter_state(&mut graph, root, false, &ctx, &mut |f| faults.push(f), &mut |_| {});
    assert!(graph.is_active(a1));
    assert!(graph.is_active(b1));

    assert!(try_fire(&mut graph, a1, ev_a1.id(), &ctx, &mut faults));
    assert!(graph.is_active(b1), "B1 is untouched by A's fork-join arrival");
    assert!(!graph.is_active(a2), "join should not fire with only one incoming satisfied");

    assert!(try_fire(&mut graph, b1, ev_b1.id(), &ctx, &mut faults));
    assert!(graph.is_active(a2));
    assert!(graph.is_active(b2));

    assert_no_faults(&faults);
}

#[test]
fn choice_takes_else_when_no_guard_is_satisfied() {
    let mut graph = Graph::new();
    let choice = graph.add_pseudostate("C", crate::graph::StateKind::Choice);
    let low = graph.add_state("Low");
    let mid = graph.add_state("Mid");

    let t_low = graph.add_transition("to-low", choice, low, TransitionKind::External);
    graph.transition_mut(t_low).guards.add(|_ctx| Ok(false));
    let _t_mid = graph.add_transition("to-mid", choice, mid, TransitionKind::External);
    // `to-mid` is left guardless, making it the else branch.

    let mut faults = Vec::new();
    let (_, ctx) = no_op_context(EventId::new());
    enter_state(&mut graph, choice, false, &ctx, &mut |f| faults.push(f), &mut |_| {});

    assert!(graph.is_active(mid));
    assert!(!graph.is_active(low));
    assert_no_faults(&faults);
}

#[test]
fn choice_with_no_satisfied_guard_and_no_else_raises() {
    let mut graph = Graph::new();
    let choice = graph.add_pseudostate("C", crate::graph::StateKind::Choice);
    let low = graph.add_state("Low");

    let t_low = graph.add_transition("to-low", choice, low, TransitionKind::External);
    graph.transition_mut(t_low).guards.add(|_ctx| Ok(false));

    let mut faults = Vec::new();
    let (_, ctx) = no_op_context(EventId::new());
    enter_state(&mut graph, choice, false, &ctx, &mut |f| faults.push(f), &mut |_| {});

    assert!(!graph.is_active(low));
    assert_eq!(faults.len(), 1);
}

/// A fork-join's outgoing transitions fire automatically once every incoming
/// is satisfied, via `enter_state` rather than `fire_transition` — so a join
/// whose own outgoing targets a second fork-join never drives that second
/// join to completion. Documents the literal behavior of the mechanism as
/// implemented, rather than a chained-synchronization feature.
#[test]
fn fork_join_chained_into_a_second_fork_join_does_not_complete_it() {
    let mut graph = Graph::new();

    let root = graph.add_composite_state("Root");
    let region_a = graph.add_region(root, "A").unwrap();
    let region_b = graph.add_region(root, "B").unwrap();

    let a1 = graph.add_state("A1");
    graph.attach_substate(region_a, a1).unwrap();
    let b1 = graph.add_state("B1");
    graph.attach_substate(region_b, b1).unwrap();

    let j1 = graph.add_pseudostate(
        "J1",
        crate::graph::StateKind::ForkJoin {
            incoming: Vec::new(),
            completed: Default::default(),
        },
    );
    graph.attach_substate(region_a, j1).unwrap();

    let j2 = graph.add_pseudostate(
        "J2",
        crate::graph::StateKind::ForkJoin {
            incoming: Vec::new(),
            completed: Default::default(),
        },
    );
    graph.attach_substate(region_b, j2).unwrap();

    let ev_a1 = Event::new("EvA1");
    let ev_b1 = Event::new("EvB1");

    let t_a1_j1 = graph.add_transition("a1->j1", a1, j1, TransitionKind::External);
    graph.add_trigger(t_a1_j1, ev_a1.id());
    let t_b1_j1 = graph.add_transition("b1->j1", b1, j1, TransitionKind::External);
    graph.add_trigger(t_b1_j1, ev_b1.id());
    // J1's only outgoing targets J2, a second fork-join awaiting its own
    // (never-satisfied) incoming set.
    let _t_j1_j2 = graph.add_transition("j1->j2", j1, j2, TransitionKind::ForkJoin { region: Some(region_b) });

    let mut faults = Vec::new();
    let (_, ctx) = no_op_context(ev_a1.id());
    enter_state(&mut graph, root, false, &ctx, &mut |f| faults.push(f), &mut |_| {});

    assert!(try_fire(&mut graph, a1, ev_a1.id(), &ctx, &mut faults));
    assert!(try_fire(&mut graph, b1, ev_b1.id(), &ctx, &mut faults));

    // J1 completed and fired its sole outgoing transition, but J2 — itself a
    // fork-join — is not marked active: `enter_state`'s fork-join arm is a
    // no-op outside of `fire_into_fork_join`.
    assert!(!graph.is_active(j2));
    assert_no_faults(&faults);
}
