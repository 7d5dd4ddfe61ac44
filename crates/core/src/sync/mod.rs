// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete OS-primitive realization (`SPEC_FULL.md` §10.4).
//!
//! This is *not* a pluggable multi-backend porting layer (that is explicitly
//! out of scope, §1) — it is the one concrete Rust implementation the budget
//! in §2 calls for. `parking_lot::Mutex` is used directly wherever the
//! framework wants a recursive-unsafe critical section; it needs no wrapper
//! of its own, so only [`signal`] and [`thread`] live here.

pub mod signal;
pub mod thread;

pub use signal::Signal;
pub use thread::{TerminationStatus, Thread, ThreadPriority};
