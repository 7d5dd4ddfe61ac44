// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition selection and firing, entry/exit sequencing, and pseudostate
//! resolution (`SPEC_FULL.md` §4.5). These are free functions over `&mut
//! Graph` rather than methods, since they thread an `ActionContext` and a
//! fault sink through a recursive traversal that has no natural single
//! receiver.

use hsm_core::{EventId, ExceptionContext};

use crate::context::ActionContext;
use crate::graph::{Graph, RegionHandle, StateHandle, StateKind, TransitionKind};

pub type FaultSink<'a> = dyn FnMut(ExceptionContext) + 'a;
pub type StateChangeSink<'a> = dyn FnMut(StateHandle) + 'a;

/// Dispatches `event_id` starting at `composite`, the root of a state
/// machine or a nested sub-machine. Mirrors `process_event` in §4.5: every
/// region is given a chance to handle the event (so orthogonal regions all
/// observe it), and only if none did does `composite` try its own outgoing
/// transitions.
pub fn process_event(
    graph: &mut Graph,
    composite: StateHandle,
    event_id: EventId,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) -> bool {
    let regions = match graph.state(composite).kind.clone() {
        StateKind::Composite { regions } => regions,
        _ => Vec::new(),
    };

    let mut handled = false;
    for region in regions {
        if let Some(active) = graph.region(region).active_substate {
            if dispatch_to_state(graph, active, event_id, ctx, on_fault, state_change) {
                handled = true;
            }
        }
    }
    if handled {
        return true;
    }
    try_fire_outgoing(graph, composite, event_id, ctx, on_fault, state_change)
}

fn dispatch_to_state(
    graph: &mut Graph,
    state: StateHandle,
    event_id: EventId,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) -> bool {
    // A fork-join left as a region's active substate (§4.5 "Fork-join")
    // is waiting on synchronization, not a normal active state: its
    // outgoing transitions are triggerless, so routing an ordinary event
    // through `try_fire_outgoing` here would fire them the moment *any*
    // event arrives, regardless of whether every incoming transition has
    // actually completed. Outgoing transitions fire only from inside
    // `fire_into_fork_join`, on full synchronization.
    if matches!(graph.state(state).kind, StateKind::ForkJoin { .. }) {
        return false;
    }
    if matches!(graph.state(state).kind, StateKind::Composite { .. })
        && process_event(graph, state, event_id, ctx, on_fault, state_change)
    {
        return true;
    }
    try_fire_outgoing(graph, state, event_id, ctx, on_fault, state_change)
}

fn try_fire_outgoing(
    graph: &mut Graph,
    state: StateHandle,
    event_id: EventId,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) -> bool {
    let outgoing = graph.state(state).outgoing.clone();
    for t in outgoing {
        if !graph.transition(t).matches(event_id) {
            continue;
        }
        let satisfied = graph.transition(t).guards.evaluate(ctx, &mut *on_fault);
        if satisfied {
            fire_transition(graph, t, ctx, on_fault, state_change);
            return true;
        }
    }
    false
}

/// Fires `t`, dispatching by kind, and logs the firing at `debug` level with
/// an elapsed-time field (`SPEC_FULL.md` §10.1), mirroring the teacher's
/// `Executor::execute` timing wrap.
fn fire_transition(
    graph: &mut Graph,
    t: crate::graph::TransitionHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    let start = std::time::Instant::now();
    let name = graph.transition(t).name.clone();
    let kind = graph.transition(t).kind;
    let source = graph.state(graph.transition(t).source).name.clone();
    let target_name = graph.state(graph.transition(t).target).name.clone();

    let target = graph.transition(t).target;
    if matches!(graph.state(target).kind, StateKind::ForkJoin { .. }) {
        fire_into_fork_join(graph, t, ctx, on_fault, state_change);
    } else {
        match kind {
            TransitionKind::Internal => {
                graph.transition(t).actions.execute(ctx, &mut *on_fault);
            }
            TransitionKind::Local => fire_local(graph, t, ctx, on_fault, state_change),
            TransitionKind::External | TransitionKind::ForkJoin { .. } => {
                fire_external(graph, t, ctx, on_fault, state_change)
            }
        }
    }

    tracing::debug!(
        transition = %name,
        source = %source,
        target = %target_name,
        kind = ?kind,
        elapsed_us = start.elapsed().as_micros() as u64,
        "transition fired"
    );
}

fn fire_local(
    graph: &mut Graph,
    t: crate::graph::TransitionHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    let source = graph.transition(t).source;
    let target = graph.transition(t).target;

    if let StateKind::Composite { regions } = graph.state(source).kind.clone() {
        for r in regions {
            exit_region(graph, r, ctx, on_fault);
        }
    }

    graph.transition(t).actions.execute(ctx, &mut *on_fault);

    if source != target {
        enter_state(graph, target, false, ctx, on_fault, state_change);
    } else if let StateKind::Composite { regions } = graph.state(source).kind.clone() {
        for r in regions {
            enter_region(graph, r, false, ctx, on_fault, state_change);
        }
    }
}

fn fire_external(
    graph: &mut Graph,
    t: crate::graph::TransitionHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    let source = graph.transition(t).source;
    let target = graph.transition(t).target;
    let lca = graph.lca(source, target);

    exit_up_to_lca(graph, source, lca, ctx, on_fault);

    graph.transition(t).actions.execute(ctx, &mut *on_fault);

    let target_chain = graph.ancestors(target);
    // `lca` comes from `graph.lca(source, target)`, which by construction
    // only ever returns a state on `target`'s own ancestor chain.
    #[allow(clippy::expect_used)]
    let idx = target_chain
        .iter()
        .position(|&s| s == lca)
        .expect("lca is an ancestor of target by construction");
    let mut chain = target_chain[..idx].to_vec();
    chain.reverse();
    enter_chain(graph, &chain, ctx, on_fault, state_change);
}

/// Exits `source` and then walks its ancestor chain, exiting each composite
/// strictly below `lca` — i.e. up to but not including the LCA (§4.5
/// "External").
fn exit_up_to_lca(
    graph: &mut Graph,
    source: StateHandle,
    lca: StateHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
) {
    exit_state(graph, source, ctx, on_fault);
    let mut cur = source;
    loop {
        let Some(region) = graph.state(cur).parent_region else {
            break;
        };
        let parent = graph.region(region).parent_state;
        if parent == lca {
            break;
        }
        exit_state(graph, parent, ctx, on_fault);
        cur = parent;
    }
}

/// Enters a chain of ancestors from just inside the LCA down to (and
/// including) the final target. Intermediate composites also enter their
/// other orthogonal regions via `initial`, since only the region holding the
/// next chain element is steered explicitly.
fn enter_chain(
    graph: &mut Graph,
    chain: &[StateHandle],
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    for i in 0..chain.len() {
        let s = chain[i];
        let next = chain.get(i + 1).copied();
        mark_active_and_enter_self(graph, s, ctx, on_fault, state_change);
        if let StateKind::Composite { regions } = graph.state(s).kind.clone() {
            for r in regions {
                if let Some(next_state) = next {
                    if graph.state(next_state).parent_region == Some(r) {
                        graph.region_mut(r).active_substate = Some(next_state);
                        continue;
                    }
                }
                enter_region(graph, r, false, ctx, on_fault, state_change);
            }
        }
    }
}

fn fire_into_fork_join(
    graph: &mut Graph,
    t: crate::graph::TransitionHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    let source = graph.transition(t).source;
    let target = graph.transition(t).target;
    let kind = graph.transition(t).kind;

    // Every pseudostate is attached to a region via `attach_substate` before
    // any transition can target it, so a fork-join reached here always has
    // a parent region.
    #[allow(clippy::expect_used)]
    let fj_region = graph
        .state(target)
        .parent_region
        .expect("fork-join pseudostate has a parent region");
    let parent_composite = graph.region(fj_region).parent_state;
    if !graph.is_active(parent_composite) {
        enter_state(graph, parent_composite, false, ctx, on_fault, state_change);
    }

    let lca = graph.lca(source, target);
    exit_up_to_lca(graph, source, lca, ctx, on_fault);

    graph.transition(t).actions.execute(ctx, &mut *on_fault);

    if let StateKind::ForkJoin { completed, .. } = &mut graph.state_mut(target).kind {
        completed.insert(t);
    }

    let assoc_region: Option<RegionHandle> = match kind {
        TransitionKind::ForkJoin { region: Some(r) } => Some(r),
        _ => graph.state(source).parent_region,
    };
    if let Some(r) = assoc_region {
        graph.region_mut(r).active_substate = Some(target);
    }

    // `fire_into_fork_join` is only ever called once the caller has already
    // matched `target`'s kind as `StateKind::ForkJoin` (see `fire_transition`
    // above), and nothing in this function reassigns `target`'s kind — but
    // rather than assert that with a panicking macro, a topology mismatch
    // here just leaves the join's state untouched.
    let (all_incoming, completed_count) = match &graph.state(target).kind {
        StateKind::ForkJoin { incoming, completed } => (incoming.clone(), completed.len()),
        _ => return,
    };

    if completed_count >= all_incoming.len() {
        let outgoing = graph.state(target).outgoing.clone();
        if let StateKind::ForkJoin { completed, .. } = &mut graph.state_mut(target).kind {
            completed.clear();
        }
        for ot in outgoing {
            graph.transition(ot).actions.execute(ctx, &mut *on_fault);
            let out_target = graph.transition(ot).target;
            enter_state(graph, out_target, false, ctx, on_fault, state_change);
        }
    }
}

fn mark_active_and_enter_self(
    graph: &mut Graph,
    s: StateHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    graph.state_mut(s).active = true;
    if let Some(region) = graph.state(s).parent_region {
        graph.region_mut(region).active_substate = Some(s);
    }
    graph.state(s).entry_actions.execute(ctx, &mut *on_fault);
    tracing::trace!(state = %graph.state(s).name, "state entered");
    state_change(s);
}

/// Enters `handle`, resolving pseudostates (initial, history, choice)
/// transparently rather than marking them active (§4.5 "History
/// pseudostates", "Choice pseudostates"). `use_history` controls whether a
/// composite entered along the way restores via history or `initial`.
pub fn enter_state(
    graph: &mut Graph,
    handle: StateHandle,
    use_history: bool,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    match graph.state(handle).kind.clone() {
        StateKind::Initial => {
            if let Some(t) = graph.state(handle).outgoing.first().copied() {
                graph.transition(t).actions.execute(ctx, &mut *on_fault);
                let next = graph.transition(t).target;
                enter_state(graph, next, false, ctx, on_fault, state_change);
            }
        }
        StateKind::ShallowHistory { default } => {
            // Every pseudostate is attached to a region via `attach_substate`
            // before any transition can target it.
            #[allow(clippy::expect_used)]
            let region = graph
                .state(handle)
                .parent_region
                .expect("history pseudostate has a parent region");
            let next = graph.region(region).history_substate.or(default);
            if let Some(next) = next {
                // Shallow: only the directly-remembered substate is
                // restored; its own nested regions (if any) use their
                // initial, not their history.
                enter_state(graph, next, false, ctx, on_fault, state_change);
            }
        }
        StateKind::DeepHistory { default } => {
            // Every pseudostate is attached to a region via `attach_substate`
            // before any transition can target it.
            #[allow(clippy::expect_used)]
            let region = graph
                .state(handle)
                .parent_region
                .expect("history pseudostate has a parent region");
            let history = graph.region(region).history_substate;
            match history {
                Some(next) => enter_state(graph, next, true, ctx, on_fault, state_change),
                None => {
                    if let Some(next) = default {
                        enter_state(graph, next, false, ctx, on_fault, state_change);
                    }
                }
            }
        }
        StateKind::Choice => fire_choice(graph, handle, ctx, on_fault, state_change),
        StateKind::ForkJoin { .. } => {
            // Entered only via `fire_into_fork_join`; reached here only if a
            // topology mistakenly targets one via a plain entry, a no-op.
        }
        StateKind::Simple => mark_active_and_enter_self(graph, handle, ctx, on_fault, state_change),
        StateKind::Composite { regions } => {
            mark_active_and_enter_self(graph, handle, ctx, on_fault, state_change);
            for r in regions {
                enter_region(graph, r, use_history, ctx, on_fault, state_change);
            }
        }
    }
}

fn enter_region(
    graph: &mut Graph,
    region: RegionHandle,
    use_history: bool,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    let target = if use_history {
        graph.region(region).history_substate.or(graph.region(region).initial)
    } else {
        graph.region(region).initial
    };
    if let Some(target) = target {
        enter_state(graph, target, use_history, ctx, on_fault, state_change);
    }
}

fn fire_choice(
    graph: &mut Graph,
    handle: StateHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
    state_change: &mut StateChangeSink<'_>,
) {
    let outgoing = graph.state(handle).outgoing.clone();
    let mut else_transition = None;
    for t in outgoing {
        if graph.transition(t).guards.is_empty() {
            if else_transition.is_some() {
                on_fault(ExceptionContext::new(
                    graph.state(handle).name.clone(),
                    "choice state has more than one else transition",
                ));
                return;
            }
            else_transition = Some(t);
            continue;
        }
        if graph.transition(t).guards.evaluate(ctx, &mut *on_fault) {
            graph.transition(t).actions.execute(ctx, &mut *on_fault);
            let target = graph.transition(t).target;
            enter_state(graph, target, false, ctx, on_fault, state_change);
            return;
        }
    }
    if let Some(t) = else_transition {
        graph.transition(t).actions.execute(ctx, &mut *on_fault);
        let target = graph.transition(t).target;
        enter_state(graph, target, false, ctx, on_fault, state_change);
    } else {
        on_fault(ExceptionContext::new(
            graph.state(handle).name.clone(),
            "choice state has no satisfied guard and no else transition",
        ));
    }
}

/// Exits `handle` and (if composite) everything beneath it, inner-to-outer
/// (§4.5 "Entry/exit actions"). Recording history is skipped when the
/// previously active substate was the region's own `initial`, so entering a
/// region and exiting it again without ever transitioning away does not
/// fabricate a history entry.
pub fn exit_state(
    graph: &mut Graph,
    handle: StateHandle,
    ctx: &ActionContext,
    on_fault: &mut FaultSink<'_>,
) {
    if let StateKind::Composite { regions } = graph.state(handle).kind.clone() {
        for r in regions {
            exit_region(graph, r, ctx, on_fault);
        }
    }
    graph.state(handle).exit_actions.execute(ctx, &mut *on_fault);
    graph.state_mut(handle).active = false;
    tracing::trace!(state = %graph.state(handle).name, "state exited");
    if let Some(region) = graph.state(handle).parent_region {
        let prev = graph.region_mut(region).active_substate.take();
        if let Some(p) = prev {
            if Some(p) != graph.region(region).initial {
                graph.region_mut(region).history_substate = Some(p);
            }
        }
    }
}

fn exit_region(graph: &mut Graph, region: RegionHandle, ctx: &ActionContext, on_fault: &mut FaultSink<'_>) {
    if let Some(active) = graph.region(region).active_substate {
        exit_state(graph, active, ctx, on_fault);
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
