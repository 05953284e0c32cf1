// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Fatal handling for broken process invariants.
//!
//! Some conditions are programming errors rather than runtime conditions: acquiring the world
//! lock twice from the same thread, or releasing it from a thread that does not own it. There is
//! no sensible recovery from these, so they are reported once with a backtrace and the process
//! is terminated.
//!
//! The termination step is selected by a [`FaultPolicy`]. Production code uses
//! [`FaultPolicy::Abort`]; tests construct their own instances with [`FaultPolicy::Panic`] so the
//! fault can be observed with `#[should_panic]` or `catch_unwind`.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;

/// Set once any invariant violation has been reported. Saves are refused after this, since the
/// world state can no longer be trusted.
static FAULT_REPORTED: AtomicBool = AtomicBool::new(false);

/// What to do after reporting an invariant violation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Log and abort the process.
    #[default]
    Abort,
    /// Log and panic on the calling thread.
    Panic,
}

/// Report a violated process invariant and terminate according to `policy`.
///
/// The report carries the violated condition and a forced backtrace of the calling thread.
pub fn invariant_violation(policy: FaultPolicy, what: &str) -> ! {
    FAULT_REPORTED.store(true, Ordering::SeqCst);
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    let backtrace = Backtrace::force_capture();
    error!(thread = thread_name, "FATAL: invariant violated: {what}\n{backtrace}");

    match policy {
        FaultPolicy::Abort => {
            eprintln!("FATAL: invariant violated on thread {thread_name}: {what}");
            std::process::abort()
        }
        FaultPolicy::Panic => panic!("invariant violated: {what}"),
    }
}

/// Check whether an invariant violation has been reported during this process' lifetime.
pub fn is_fault_reported() -> bool {
    FAULT_REPORTED.load(Ordering::SeqCst)
}
