// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;

#[test]
fn post_before_wait_is_not_lost() {
    let signal = Signal::new();
    signal.post();
    signal.wait();
}

#[test]
fn wait_timeout_returns_false_when_nothing_posted() {
    let signal = Signal::new();
    assert!(!signal.wait_timeout(Duration::from_millis(20)));
}

#[test]
fn wait_timeout_returns_true_when_posted() {
    let signal = Signal::new();
    signal.post();
    assert!(signal.wait_timeout(Duration::from_millis(20)));
}

#[test]
fn wakes_a_blocked_waiter() {
    let signal = Arc::new(Signal::new());
    let waiter = Arc::clone(&signal);
    let handle = thread::spawn(move || {
        waiter.wait();
    });
    thread::sleep(Duration::from_millis(20));
    signal.post();
    handle.join().expect("waiter thread should not panic");
}
