// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The timer core: a single high-priority thread driving a list of scheduled
//! actions ordered by absolute expiry time (`SPEC_FULL.md` §4.3).
//!
//! Ties are broken FIFO via a monotonic sequence number rather than relying
//! on `Vec` insertion stability across repeated `drain`/re-insert cycles.
//! Entries live in a single `Vec` kept sorted by `(execution_time_ms, seq)`;
//! a dedicated thread (`hsm_core::sync::Thread`) sleeps on the gap to the
//! head deadline and wakes early whenever [`Timer::schedule`] lands a new
//! head.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hsm_core::sync::{Signal, TerminationStatus, Thread, ThreadPriority};
use hsm_core::{Clock, ExceptionContext, SmallFields, TraceEntry, TraceSink};

pub type TimerCallback = dyn Fn() + Send + Sync;

/// Stable identity for a scheduled action, returned by [`Timer::schedule`]
/// and used to [`Timer::unschedule`] it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerActionId(u64);

struct ScheduledAction {
    id: TimerActionId,
    name: String,
    repeat_ms: u64,
    callback: Arc<TimerCallback>,
}

struct TimerEntry {
    execution_time_ms: u64,
    seq: u64,
    action: ScheduledAction,
}

struct TimerState {
    entries: Vec<TimerEntry>,
    max_observed_gap_ms: u64,
    last_gap_trace_ms: Option<u64>,
}

/// Singleton-style timer service (`SPEC_FULL.md` §9 "Global state": modeled
/// as an explicit service created during environment initialization rather
/// than a hidden process global).
pub struct Timer<C: Clock> {
    clock: C,
    state: Mutex<TimerState>,
    signal: Signal,
    next_id: AtomicU64,
    terminating: AtomicBool,
    max_allowable_gap_ms: u64,
    thread: Mutex<Option<Thread>>,
    trace: Arc<dyn TraceSink>,
    on_fault: Arc<dyn Fn(ExceptionContext) + Send + Sync>,
    on_time_gap: Mutex<Option<Arc<dyn Fn(u64) + Send + Sync>>>,
}

impl<C: Clock + 'static> Timer<C> {
    pub fn new(
        clock: C,
        max_allowable_gap_ms: u64,
        trace: Arc<dyn TraceSink>,
        on_fault: Arc<dyn Fn(ExceptionContext) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            state: Mutex::new(TimerState {
                entries: Vec::new(),
                max_observed_gap_ms: 0,
                last_gap_trace_ms: None,
            }),
            signal: Signal::new(),
            next_id: AtomicU64::new(1),
            terminating: AtomicBool::new(false),
            max_allowable_gap_ms,
            thread: Mutex::new(None),
            trace,
            on_fault,
            on_time_gap: Mutex::new(None),
        })
    }

    /// Installs the diagnostic hook fired when dispatch lag exceeds the
    /// configured threshold (§4.3 step 5).
    pub fn set_time_gap_hook(&self, hook: impl Fn(u64) + Send + Sync + 'static) {
        *self.on_time_gap.lock() = Some(Arc::new(hook));
    }

    /// Spawns the dedicated timer thread. Idempotent only in the sense that
    /// calling it twice spawns two threads — callers (the environment
    /// registry) are expected to call this exactly once.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let thread = Thread::spawn("hsm-timer", ThreadPriority::High, move |token| {
            this.run(token)
        });
        *self.thread.lock() = Some(thread);
    }

    fn run(self: Arc<Self>, token: hsm_core::sync::thread::StopToken) {
        loop {
            if token.should_stop() {
                break;
            }
            let next_deadline = { self.state.lock().entries.first().map(|e| e.execution_time_ms) };
            match next_deadline {
                None => {
                    self.signal.wait_timeout(Duration::from_millis(200));
                }
                Some(deadline) => {
                    let now = self.clock.epoch_ms();
                    if deadline > now {
                        let wait_ms = (deadline - now).min(200);
                        self.signal.wait_timeout(Duration::from_millis(wait_ms));
                        continue;
                    }
                }
            }
            if self.terminating.load(Ordering::Acquire) && self.state.lock().entries.is_empty() {
                break;
            }
            self.fire_due();
        }
    }

    /// Drains and runs every action due at the current time, looping until
    /// none remain. A periodic action only ever has one pending instance in
    /// the list at a time (the next one is inserted as the prior fires), so
    /// catching up several elapsed periods in a single wake (§4.3 step 3-4,
    /// §8 "periodic timer drift") requires repeating the collect/reinsert
    /// pass rather than a single prefix drain — otherwise a long dispatch
    /// gap would only ever replay the single most-overdue instance.
    fn fire_due(&self) {
        let now = self.clock.epoch_ms();
        let mut due_all: Vec<TimerEntry> = Vec::new();
        {
            let mut state = self.state.lock();
            let first_head_time = state.entries.first().map(|e| e.execution_time_ms);
            loop {
                let split = state
                    .entries
                    .iter()
                    .position(|e| e.execution_time_ms > now)
                    .unwrap_or(state.entries.len());
                if split == 0 {
                    break;
                }
                let due: Vec<TimerEntry> = state.entries.drain(..split).collect();
                for entry in &due {
                    if entry.action.repeat_ms > 0 {
                        let next_time = entry.execution_time_ms + entry.action.repeat_ms;
                        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
                        insert_sorted(
                            &mut state.entries,
                            TimerEntry {
                                execution_time_ms: next_time,
                                seq,
                                action: ScheduledAction {
                                    id: entry.action.id,
                                    name: entry.action.name.clone(),
                                    repeat_ms: entry.action.repeat_ms,
                                    callback: Arc::clone(&entry.action.callback),
                                },
                            },
                        );
                    }
                }
                due_all.extend(due);
            }

            if let Some(head_time) = first_head_time {
                if !due_all.is_empty() {
                    self.observe_gap(&mut state, head_time, now);
                }
            }
        }

        for entry in due_all {
            (entry.action.callback)();
        }
    }

    /// Records dispatch lag and fires the diagnostic hook at most once per
    /// `max_allowable_gap_ms` window (§4.3 step 5).
    fn observe_gap(&self, state: &mut TimerState, head_execution_time_ms: u64, now: u64) {
        let gap = now.saturating_sub(head_execution_time_ms);
        state.max_observed_gap_ms = state.max_observed_gap_ms.max(gap);
        if gap <= self.max_allowable_gap_ms {
            return;
        }
        let should_fire = match state.last_gap_trace_ms {
            Some(last) => now.saturating_sub(last) > self.max_allowable_gap_ms,
            None => true,
        };
        if !should_fire {
            return;
        }
        state.last_gap_trace_ms = Some(now);
        tracing::warn!(gap_ms = gap, max_allowable_gap_ms = self.max_allowable_gap_ms, "timer dispatch lag exceeded threshold");
        if let Some(hook) = self.on_time_gap.lock().clone() {
            hook(gap);
        }
        if self.trace.enabled() {
            self.trace.record(TraceEntry::new(
                now,
                "TimeGapExceeded",
                SmallFields::new().push("gap_ms", gap.to_string()),
            ));
        }
    }

    pub fn max_observed_gap_ms(&self) -> u64 {
        self.state.lock().max_observed_gap_ms
    }

    /// Schedules `callback` to run after `delay_ms`, repeating every
    /// `repeat_ms` if nonzero (§4.3). Rejected while the timer is
    /// terminating.
    pub fn schedule(
        &self,
        name: impl Into<String>,
        delay_ms: u64,
        repeat_ms: u64,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<TimerActionId, hsm_core::LifecycleError> {
        let name = name.into();
        if self.terminating.load(Ordering::Acquire) {
            return Err(hsm_core::LifecycleError::TimerTerminated { action: name });
        }
        let id = TimerActionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let execution_time_ms = self.clock.epoch_ms() + delay_ms;
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = TimerEntry {
            execution_time_ms,
            seq,
            action: ScheduledAction {
                id,
                name,
                repeat_ms,
                callback: Arc::new(callback),
            },
        };
        let mut state = self.state.lock();
        let became_head = insert_sorted(&mut state.entries, entry);
        drop(state);
        if became_head {
            self.signal.post();
        }
        Ok(id)
    }

    /// Removes a scheduled action by identity. Returns `false` if it was
    /// already fired (one-shot) or never existed.
    pub fn unschedule(&self, id: TimerActionId) -> bool {
        let mut state = self.state.lock();
        let was_head = state.entries.first().map(|e| e.action.id) == Some(id);
        let before = state.entries.len();
        state.entries.retain(|e| e.action.id != id);
        let removed = state.entries.len() != before;
        drop(state);
        if removed && was_head {
            self.signal.post();
        }
        removed
    }

    /// Marks the timer terminating (rejecting further `schedule` calls),
    /// wakes the thread, and joins it with a bound (§4.3 "Shutdown").
    pub fn shutdown(&self, timeout: Duration, poll_interval: Duration) -> TerminationStatus {
        self.terminating.store(true, Ordering::Release);
        self.state.lock().entries.clear();
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

/// Inserts `entry` keeping the vec sorted by `(execution_time_ms, seq)`.
/// Returns whether the insertion landed at index 0 (a new head).
fn insert_sorted(entries: &mut Vec<TimerEntry>, entry: TimerEntry) -> bool {
    let pos = entries
        .iter()
        .position(|e| {
            (e.execution_time_ms, e.seq) > (entry.execution_time_ms, entry.seq)
        })
        .unwrap_or(entries.len());
    entries.insert(pos, entry);
    pos == 0
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
