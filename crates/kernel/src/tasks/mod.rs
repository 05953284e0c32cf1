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

//! Background work: a blocking task queue and the worker pools which drain it.

use std::any::Any;
use std::num::NonZeroUsize;
use std::time::Duration;

pub use elastic_pool::ElasticPool;
pub use fixed_pool::FixedPool;
pub use task_queue::{Canceled, TaskQueue};

mod elastic_pool;
mod fixed_pool;
mod task_queue;
mod worker;

/// A unit of background work. Takes nothing and returns nothing; anything a caller needs back
/// travels through a [`CompletionHandle`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped before it completed")]
    Abandoned,
    #[error("timed out waiting for task completion")]
    Timeout,
}

/// The receiving half of a completion pair. Resolves exactly once, with the task's result or its
/// failure.
#[must_use = "dropping a completion handle discards the task's result"]
pub struct CompletionHandle<T = ()> {
    receiver: oneshot::Receiver<Result<T, TaskError>>,
}

/// The fulfilling half of a completion pair.
pub struct Completer<T = ()> {
    sender: oneshot::Sender<Result<T, TaskError>>,
}

/// Create a connected completer / handle pair.
pub fn completion_pair<T>() -> (Completer<T>, CompletionHandle<T>) {
    let (sender, receiver) = oneshot::channel();
    (Completer { sender }, CompletionHandle { receiver })
}

impl<T> Completer<T> {
    /// Fulfill the handle. If the handle was already dropped nobody is listening, which is fine.
    pub fn complete(self, result: Result<T, TaskError>) {
        let _ = self.sender.send(result);
    }
}

impl<T> CompletionHandle<T> {
    /// Block until the task completes.
    pub fn wait(self) -> Result<T, TaskError> {
        self.receiver.recv().unwrap_or(Err(TaskError::Abandoned))
    }

    /// Block until the task completes, or `timeout` passes.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(oneshot::RecvTimeoutError::Timeout) => Err(TaskError::Timeout),
            Err(oneshot::RecvTimeoutError::Disconnected) => Err(TaskError::Abandoned),
        }
    }
}

/// Wrap `f` so that its outcome, including a panic, is delivered to the returned handle.
pub(crate) fn checked_task<F, T>(f: F) -> (Task, CompletionHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (completer, handle) = completion_pair();
    let task: Task = Box::new(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
            .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));
        completer.complete(result);
    });
    (task, handle)
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// The number of workers a fixed pool gets when none is asked for: the logical core count, and
/// never fewer than one.
pub fn default_worker_count() -> usize {
    gdt_cpus::num_logical_cores()
        .ok()
        .or_else(|| std::thread::available_parallelism().ok().map(NonZeroUsize::get))
        .unwrap_or(1)
        .max(1)
}
