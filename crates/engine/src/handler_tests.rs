// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hsm_core::{Event, NullTraceSink};

use super::*;
use crate::event_thread::EventThread;

fn make_thread() -> Arc<EventThread> {
    EventThread::new("t", Arc::new(NullTraceSink), Arc::new(|_| {}))
}

#[test]
fn reactions_only_fire_once_started() {
    let thread = make_thread();
    let handler = EventHandler::new("h", thread, Arc::new(|_| {}));
    let ping = Event::new("Ping");
    let hits = Arc::new(AtomicU32::new(0));
    {
        let hits = Arc::clone(&hits);
        handler.add_reaction(ping.id(), move |_ctx| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    handler.handle_event(ping.copy(hsm_core::Ownership::RetainedByCaller));
    assert_eq!(hits.load(Ordering::SeqCst), 0, "not started yet");

    handler.handle_event(handler.control.start.clone());
    handler.handle_event(ping.copy(hsm_core::Ownership::RetainedByCaller));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn remove_reaction_stops_it_from_firing() {
    let thread = make_thread();
    let handler = EventHandler::new("h", thread, Arc::new(|_| {}));
    let ev = Event::new("Ev");
    let hits = Arc::new(AtomicU32::new(0));
    let action_handle = {
        let hits = Arc::clone(&hits);
        handler.add_reaction(ev.id(), move |_ctx| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    assert!(handler.has_event(ev.id()));
    assert!(handler.remove_reaction(ev.id(), action_handle));
}

#[test]
fn terminate_detaches_from_thread_and_is_idempotent() {
    let thread = make_thread();
    let handler = EventHandler::new("h", thread.clone(), Arc::new(|_| {}));

    handler.terminate();
    let terminate_event = handler.control.terminate.clone();
    handler.handle_event(terminate_event.clone());
    assert_eq!(handler.termination_status(), TerminationStatus::Terminated);
    assert!(handler.is_terminated());

    // A second terminate is a no-op, not a panic.
    handler.handle_event(terminate_event);
}

#[test]
fn queue_event_is_dropped_once_terminating_except_for_terminate_itself() {
    let thread = make_thread();
    let handler = EventHandler::new("h", thread, Arc::new(|_| {}));
    *handler.termination_status.lock() = TerminationStatus::Terminating;

    let ev = Event::new("Whatever");
    handler.queue_event(ev, false);
    assert_eq!(handler.thread.queue_len(), 0, "non-terminate events are dropped while terminating");
}

/// Races `terminate()` against a flood of ordinary events from another
/// thread. Whichever interleaving wins, the handler must end up terminated
/// and must never panic or accept an event after `Terminated` is observed
/// (`SPEC_FULL.md` §9 "Open questions": terminate races an ordinary event —
/// implemented as "whichever the event thread dequeues first wins", not a
/// hard priority rule).
#[test]
fn terminate_racing_ordinary_events_always_converges_on_terminated() {
    for _ in 0..50 {
        let thread = make_thread();
        let handler = EventHandler::new("h", thread.clone(), Arc::new(|_| {}));
        thread.start();
        handler.start();

        let flooder = {
            let handler = Arc::clone(&handler);
            std::thread::spawn(move || {
                for i in 0..200 {
                    handler.queue_event(Event::new(format!("Ev{i}")), false);
                }
            })
        };
        handler.terminate();
        flooder.join().unwrap();

        assert!(wait_until(
            || handler.termination_status() == TerminationStatus::Terminated,
            std::time::Duration::from_secs(2)
        ));
        thread.shutdown(std::time::Duration::from_secs(1), std::time::Duration::from_millis(5));
    }
}

fn wait_until(mut pred: impl FnMut() -> bool, timeout: std::time::Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while !pred() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    true
}
