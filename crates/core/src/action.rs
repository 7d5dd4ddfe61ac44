// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions and guards as ordered lists of typed function objects carrying a context.
//!
//! Both lists are generic over the context type passed at evaluation time;
//! the engine crate instantiates them over its own `ActionContext`. Removal is
//! by stable handle (returned at registration), not by equality, since
//! closures have no useful `PartialEq`.

use crate::error::{DispatchError, ExceptionContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable identity for a registered action or guard, used for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle(u64);

fn next_handle() -> ActionHandle {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    ActionHandle(NEXT.fetch_add(1, Ordering::Relaxed))
}

type ActionFn<Ctx> = dyn Fn(&Ctx) -> Result<(), DispatchError> + Send + Sync;
type GuardFn<Ctx> = dyn Fn(&Ctx) -> Result<bool, DispatchError> + Send + Sync;

/// An ordered list of actions, executed in registration order.
///
/// A fault raised by one action is caught, routed through `on_fault`, and does
/// not prevent the remaining actions in the list from running — this mirrors
/// the framework's "a guard/action fault does not corrupt the RTC step"
/// contract (entry/exit actions must not leave a state half-entered because a
/// sibling action panicked).
pub struct ActionList<Ctx> {
    items: Vec<(ActionHandle, Arc<ActionFn<Ctx>>)>,
}

impl<Ctx> Default for ActionList<Ctx> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<Ctx> ActionList<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        action: impl Fn(&Ctx) -> Result<(), DispatchError> + Send + Sync + 'static,
    ) -> ActionHandle {
        let handle = next_handle();
        self.items.push((handle, Arc::new(action)));
        handle
    }

    pub fn remove(&mut self, handle: ActionHandle) -> bool {
        let before = self.items.len();
        self.items.retain(|(h, _)| *h != handle);
        self.items.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Executes every action in order. Faults are routed to `on_fault` and do
    /// not stop later actions from running.
    pub fn execute(&self, ctx: &Ctx, on_fault: &mut dyn FnMut(ExceptionContext)) {
        for (_, action) in &self.items {
            if let Err(error) = action(ctx) {
                on_fault(ExceptionContext::from_error("action", &error));
            }
        }
    }
}

/// An ordered list of guards, evaluated as a conjunction.
///
/// An empty guard list is vacuously true (an unguarded transition always
/// fires). A guard that raises is caught, routed, and treated as `false` —
/// the transition is simply not taken, the RTC step continues.
pub struct GuardList<Ctx> {
    items: Vec<(ActionHandle, Arc<GuardFn<Ctx>>)>,
}

impl<Ctx> Default for GuardList<Ctx> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<Ctx> GuardList<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        guard: impl Fn(&Ctx) -> Result<bool, DispatchError> + Send + Sync + 'static,
    ) -> ActionHandle {
        let handle = next_handle();
        self.items.push((handle, Arc::new(guard)));
        handle
    }

    pub fn remove(&mut self, handle: ActionHandle) -> bool {
        let before = self.items.len();
        self.items.retain(|(h, _)| *h != handle);
        self.items.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn evaluate(&self, ctx: &Ctx, on_fault: &mut dyn FnMut(ExceptionContext)) -> bool {
        for (_, guard) in &self.items {
            match guard(ctx) {
                Ok(true) => continue,
                Ok(false) => return false,
                Err(error) => {
                    on_fault(ExceptionContext::from_error("guard", &error));
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
