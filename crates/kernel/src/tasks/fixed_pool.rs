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

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::tasks::worker::{PoolShared, Spawner, default_spawner, worker_loop};
use crate::tasks::{CompletionHandle, Task, checked_task, default_worker_count};

/// A pool of a fixed number of long-lived worker threads sharing one queue.
///
/// Dropping the pool shuts the workers down cooperatively. Every task pushed before the drop is
/// still executed exactly once, either by a worker or by the dropping thread.
pub struct FixedPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl FixedPool {
    /// A pool with one worker per logical core.
    pub fn new(name: &str) -> Self {
        Self::with_workers(default_worker_count(), name)
    }

    pub fn with_workers(count: usize, name: &str) -> Self {
        Self::with_spawner(count, name, &*default_spawner())
    }

    pub(crate) fn with_spawner(count: usize, name: &str, spawner: &Spawner) -> Self {
        let shared = PoolShared::new(name);
        let count = count.max(1);
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let worker_shared = shared.clone();
            // Spawn failures are logged by the spawner; the pool runs with what it has.
            if let Ok(handle) = spawner(
                format!("{name} {i}"),
                Box::new(move || worker_loop(&worker_shared, None)),
            ) {
                workers.push(handle);
            }
        }
        if workers.len() < count {
            warn!(
                pool = name,
                requested = count,
                started = workers.len(),
                "Pool started with fewer workers than requested"
            );
        } else {
            info!(pool = name, workers = count, "Started worker pool");
        }
        Self { shared, workers }
    }

    /// Fire-and-forget. A panic in `task` is logged and ends the worker which ran it.
    pub fn push(&self, task: Task) {
        self.shared.queue.push(task);
    }

    /// Enqueue `f` and return a handle which resolves with its result, or with
    /// [`crate::tasks::TaskError::Panicked`] if it panicked.
    pub fn checked_push<F, T>(&self, f: F) -> CompletionHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = checked_task(f);
        self.push(task);
        handle
    }

    /// Number of workers which actually started.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        let workers = std::mem::take(&mut self.workers);
        self.shared.shutdown(workers);
    }
}
