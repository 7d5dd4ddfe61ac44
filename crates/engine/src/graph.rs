// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state graph: an arena of states, regions, and transitions addressed
//! by lightweight index handles rather than `Rc`/`RefCell` cycles
//! (`SPEC_FULL.md` §9 "Cyclic object graphs"). The arena's strong direction
//! is parent → child (`Graph` owns every node); substate → region,
//! transition → source/target, and fork-join → incoming-transition back-edges
//! are all plain handles, non-owning by construction.

use std::collections::HashSet;

use hsm_core::{EventId, GuardList, TopologyError};

use crate::context::ActionContext;

/// Index into [`Graph::states`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHandle(pub(crate) usize);

/// Index into [`Graph::regions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionHandle(pub(crate) usize);

/// Index into [`Graph::transitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionHandle(pub(crate) usize);

/// Tag distinguishing a state node's role, replacing the deep-inheritance
/// `State`/`CompositeState`/pseudostate hierarchy with a single variant the
/// engine dispatches on (§9 "Polymorphism over state kinds").
#[derive(Debug, Clone)]
pub enum StateKind {
    Simple,
    Composite { regions: Vec<RegionHandle> },
    Initial,
    /// `default` is the substate entered when the parent region has no
    /// recorded history yet (§4.5 "History pseudostates"); it is tracked on
    /// the pseudostate itself rather than reusing `Region::initial`, since a
    /// region's normal entry point may *be* this history pseudostate.
    ShallowHistory { default: Option<StateHandle> },
    DeepHistory { default: Option<StateHandle> },
    Choice,
    ForkJoin {
        incoming: Vec<TransitionHandle>,
        completed: HashSet<TransitionHandle>,
    },
}

/// A node in the state graph. Shared fields (active flag, parent link,
/// entry/exit lists) live here regardless of `kind`.
pub struct StateNode {
    pub name: String,
    pub parent_region: Option<RegionHandle>,
    pub kind: StateKind,
    pub active: bool,
    pub entry_actions: hsm_core::ActionList<ActionContext>,
    pub exit_actions: hsm_core::ActionList<ActionContext>,
    pub incoming: Vec<TransitionHandle>,
    pub outgoing: Vec<TransitionHandle>,
}

impl StateNode {
    fn new(name: impl Into<String>, kind: StateKind) -> Self {
        Self {
            name: name.into(),
            parent_region: None,
            kind,
            active: false,
            entry_actions: hsm_core::ActionList::new(),
            exit_actions: hsm_core::ActionList::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }
}

pub struct RegionNode {
    pub name: String,
    pub parent_state: StateHandle,
    pub substates: Vec<StateHandle>,
    pub initial: Option<StateHandle>,
    pub active_substate: Option<StateHandle>,
    pub history_substate: Option<StateHandle>,
    /// Tracks whether `initial` was set by an explicit `Initial` pseudostate
    /// (as opposed to the provisional "first substate attached" default), so
    /// a second explicit one can be rejected.
    explicit_initial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Internal,
    Local,
    External,
    /// A fork-join-to-fork-join transition; `region` is the region (if any)
    /// whose active substate is updated to the target fork-join (§4.5).
    ForkJoin { region: Option<RegionHandle> },
}

impl TransitionKind {
    fn canonical_rank(self) -> u8 {
        match self {
            TransitionKind::Internal => 0,
            TransitionKind::Local => 1,
            TransitionKind::External | TransitionKind::ForkJoin { .. } => 2,
        }
    }
}

pub struct TransitionNode {
    pub name: String,
    pub source: StateHandle,
    pub target: StateHandle,
    pub triggers: Vec<EventId>,
    pub guards: GuardList<ActionContext>,
    pub actions: hsm_core::ActionList<ActionContext>,
    pub kind: TransitionKind,
}

impl TransitionNode {
    /// A transition fires on `event` iff it has no triggers (a completion
    /// transition) or one of its triggers matches the event's id (§4.2).
    pub fn matches(&self, event_id: EventId) -> bool {
        self.triggers.is_empty() || self.triggers.contains(&event_id)
    }
}

#[derive(Default)]
pub struct Graph {
    states: Vec<StateNode>,
    regions: Vec<RegionNode>,
    transitions: Vec<TransitionNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, name: impl Into<String>) -> StateHandle {
        self.states.push(StateNode::new(name, StateKind::Simple));
        StateHandle(self.states.len() - 1)
    }

    pub fn add_composite_state(&mut self, name: impl Into<String>) -> StateHandle {
        self.states.push(StateNode::new(
            name,
            StateKind::Composite {
                regions: Vec::new(),
            },
        ));
        StateHandle(self.states.len() - 1)
    }

    pub fn add_pseudostate(&mut self, name: impl Into<String>, kind: StateKind) -> StateHandle {
        self.states.push(StateNode::new(name, kind));
        StateHandle(self.states.len() - 1)
    }

    /// Attaches a new region to `composite`. Errors if `composite` is not a
    /// composite state (§9 "null parent for region" is the dual of this:
    /// here the parent exists but has no region slot).
    pub fn add_region(
        &mut self,
        composite: StateHandle,
        name: impl Into<String>,
    ) -> Result<RegionHandle, TopologyError> {
        let name = name.into();
        let handle = RegionHandle(self.regions.len());
        self.regions.push(RegionNode {
            name: name.clone(),
            parent_state: composite,
            substates: Vec::new(),
            initial: None,
            active_substate: None,
            history_substate: None,
            explicit_initial: false,
        });
        match &mut self.states[composite.0].kind {
            StateKind::Composite { regions } => {
                regions.push(handle);
                Ok(handle)
            }
            _ => Err(TopologyError::RegionHasNoParent { region: name }),
        }
    }

    /// Attaches `state` to `region`. The first substate attached becomes a
    /// provisional initial; an explicit [`StateKind::Initial`] pseudostate
    /// overrides it, and a second one is an error (§4.1).
    pub fn attach_substate(
        &mut self,
        region: RegionHandle,
        state: StateHandle,
    ) -> Result<(), TopologyError> {
        let is_initial_kind = matches!(self.states[state.0].kind, StateKind::Initial);
        let r = &mut self.regions[region.0];
        if is_initial_kind {
            if r.explicit_initial {
                return Err(TopologyError::DuplicateInitialState {
                    region: r.name.clone(),
                });
            }
            r.explicit_initial = true;
            r.initial = Some(state);
        } else if r.initial.is_none() {
            r.initial = Some(state);
        }
        r.substates.push(state);
        self.states[state.0].parent_region = Some(region);
        Ok(())
    }

    /// Adds a transition, registering it on `target`'s incoming list and
    /// inserting it into `source`'s outgoing list in canonical order:
    /// internal before the first non-internal, local before the first
    /// external, external (and fork-join) always appended (§4.1).
    pub fn add_transition(
        &mut self,
        name: impl Into<String>,
        source: StateHandle,
        target: StateHandle,
        kind: TransitionKind,
    ) -> TransitionHandle {
        let handle = TransitionHandle(self.transitions.len());
        self.transitions.push(TransitionNode {
            name: name.into(),
            source,
            target,
            triggers: Vec::new(),
            guards: GuardList::new(),
            actions: hsm_core::ActionList::new(),
            kind,
        });
        self.states[target.0].incoming.push(handle);
        let new_rank = kind.canonical_rank();
        let outgoing = &mut self.states[source.0].outgoing;
        let transitions = &self.transitions;
        let pos = outgoing
            .iter()
            .position(|h| transitions[h.0].kind.canonical_rank() > new_rank)
            .unwrap_or(outgoing.len());
        outgoing.insert(pos, handle);
        if let StateKind::ForkJoin { incoming, .. } = &mut self.states[target.0].kind {
            incoming.push(handle);
        }
        handle
    }

    pub fn add_trigger(&mut self, transition: TransitionHandle, event_id: EventId) {
        self.transitions[transition.0].triggers.push(event_id);
    }

    pub fn state(&self, handle: StateHandle) -> &StateNode {
        &self.states[handle.0]
    }

    pub fn state_mut(&mut self, handle: StateHandle) -> &mut StateNode {
        &mut self.states[handle.0]
    }

    pub fn region(&self, handle: RegionHandle) -> &RegionNode {
        &self.regions[handle.0]
    }

    pub fn region_mut(&mut self, handle: RegionHandle) -> &mut RegionNode {
        &mut self.regions[handle.0]
    }

    pub fn transition(&self, handle: TransitionHandle) -> &TransitionNode {
        &self.transitions[handle.0]
    }

    pub fn transition_mut(&mut self, handle: TransitionHandle) -> &mut TransitionNode {
        &mut self.transitions[handle.0]
    }

    pub fn is_active(&self, state: StateHandle) -> bool {
        self.states[state.0].active
    }

    /// Whether `state` is part of the active configuration. Since entering a
    /// substate always marks every ancestor composite active too, checking
    /// the active flag directly already captures "in state, possibly via an
    /// active descendant" — no separate recursive walk is needed.
    pub fn is_in_state(&self, state: StateHandle) -> bool {
        self.is_active(state)
    }

    /// The chain from `state` up to (and including) the topmost state with
    /// no parent region.
    pub fn ancestors(&self, state: StateHandle) -> Vec<StateHandle> {
        let mut chain = vec![state];
        let mut cur = state;
        while let Some(region) = self.states[cur.0].parent_region {
            let parent = self.regions[region.0].parent_state;
            chain.push(parent);
            cur = parent;
        }
        chain
    }

    /// Lowest common ancestor of `a` and `b`. Every state graph has a
    /// topmost composite with no parent region, which is always a common
    /// ancestor, so this never fails to find one.
    // Every ancestors() chain ends at the same rootless top state, so it is
    // always in chain_b too.
    #[allow(clippy::expect_used)]
    pub fn lca(&self, a: StateHandle, b: StateHandle) -> StateHandle {
        let chain_a = self.ancestors(a);
        let chain_b: HashSet<StateHandle> = self.ancestors(b).into_iter().collect();
        *chain_a
            .iter()
            .find(|s| chain_b.contains(s))
            .expect("every pair of states shares the topmost ancestor")
    }

    /// Clears every active flag, region active-substate, region
    /// history-substate, and fork-join completed-set across the whole
    /// topology, without running any exit action. This is the graph-level
    /// primitive behind `reset_state_machine` (`SPEC_FULL.md` §3 "Ownership
    /// and lifecycle": "a reset clears history substates and active
    /// substates but does not destroy topology") — deliberately a hard
    /// reset rather than a normal exit sequence, so it never re-enters a
    /// user exit action while clearing state the machine never visited.
    pub fn reset_all(&mut self) {
        for state in &mut self.states {
            state.active = false;
            if let StateKind::ForkJoin { completed, .. } = &mut state.kind {
                completed.clear();
            }
        }
        for region in &mut self.regions {
            region.active_substate = None;
            region.history_substate = None;
        }
    }
}
