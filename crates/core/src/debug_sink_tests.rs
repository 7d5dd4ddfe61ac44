// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn zero_bound_drops_every_write_without_blocking() {
    let sink = BoundedDebugSink::new(0);
    sink.write_line("hello");
    sink.write_line("world");
    assert_eq!(sink.dropped_count(), 2);
}

#[test]
fn writes_within_bound_are_not_dropped() {
    let sink = BoundedDebugSink::new(4);
    for _ in 0..4 {
        sink.write_line("line");
    }
    assert_eq!(sink.dropped_count(), 0);
}
