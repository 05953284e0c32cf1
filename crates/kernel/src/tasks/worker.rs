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

use std::backtrace::Backtrace;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use hearth_common::util::spawn_named;
use tracing::{debug, error};

use crate::tasks::{Task, TaskQueue, panic_message};

/// Starts a pool's worker threads: thread name, thread body.
pub(crate) type Spawner = dyn Fn(String, Task) -> io::Result<JoinHandle<()>> + Send + Sync;

pub(crate) fn default_spawner() -> Box<Spawner> {
    Box::new(|name, body| spawn_named(name, body))
}

/// Starts the first `working` workers, and fails the rest the way an exhausted OS would.
#[cfg(test)]
pub(crate) fn failing_spawner(working: usize) -> Box<Spawner> {
    use std::sync::atomic::AtomicUsize;

    let attempts = AtomicUsize::new(0);
    Box::new(move |name, body| {
        let builder = if attempts.fetch_add(1, Ordering::SeqCst) < working {
            std::thread::Builder::new()
        } else {
            std::thread::Builder::new().stack_size(1 << 61)
        };
        hearth_common::util::spawn_named_with(builder, name, body)
    })
}

/// State shared between a pool handle and its workers.
pub(crate) struct PoolShared {
    pub(crate) name: String,
    pub(crate) queue: TaskQueue,
    pub(crate) done: AtomicBool,
}

impl PoolShared {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            queue: TaskQueue::new(),
            done: AtomicBool::new(false),
        })
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// The task which ends a pool: every worker observes it through the queue cancellation.
    pub(crate) fn shutdown_task(self: &Arc<Self>) -> Task {
        let shared = self.clone();
        Box::new(move || {
            shared.done.store(true, Ordering::Release);
            shared.queue.cancel();
        })
    }

    /// Execute whatever is still queued on the calling thread.
    pub(crate) fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let remaining = self.queue.pop_remaining();
            if remaining.is_empty() {
                return ran;
            }
            for task in remaining {
                run_task(&self.name, task);
                ran += 1;
            }
        }
    }

    /// Signal shutdown, join `workers`, and run anything the workers left behind.
    pub(crate) fn shutdown(self: &Arc<Self>, workers: Vec<JoinHandle<()>>) {
        self.queue.push(self.shutdown_task());
        let worker_count = workers.len();
        for worker in workers {
            if worker.join().is_err() {
                error!(pool = %self.name, "Worker thread exited abnormally");
            }
        }
        let drained = self.drain();
        debug!(pool = %self.name, worker_count, drained, "Pool shut down");
    }
}

/// Run one task. A panic is logged and reported as `false` rather than propagated.
pub(crate) fn run_task(pool: &str, task: Task) -> bool {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                pool,
                panic = %panic_message(payload.as_ref()),
                "Background task panicked"
            );
            false
        }
    }
}

/// Marks a worker busy for the lifetime of the guard.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Body of every pool worker thread.
///
/// A panicking task ends its worker. The busy flag stays set so a dead worker never reads as
/// idle; its share of the queue falls to the other workers or to the shutdown drain.
pub(crate) fn worker_loop(shared: &PoolShared, busy: Option<&AtomicBool>) {
    while !shared.is_done() {
        let Ok(task) = shared.queue.pop_wait() else {
            break;
        };
        let busy_guard = busy.map(BusyGuard::new);
        if !run_task(&shared.name, task) {
            std::mem::forget(busy_guard);
            let thread = std::thread::current();
            error!(
                pool = %shared.name,
                thread = thread.name().unwrap_or("<unnamed>"),
                "Worker exiting after task panic\n{}",
                Backtrace::force_capture()
            );
            return;
        }
    }
    shared.drain();
}
