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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::tasks::worker::{PoolShared, Spawner, default_spawner, worker_loop};
use crate::tasks::{CompletionHandle, Task, checked_task};

struct ElasticWorker {
    busy: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A pool which grows by one worker whenever work arrives and nobody is idle to take it.
///
/// Idle workers are never retired before the pool is dropped; only a worker ended by a panicking
/// task leaves early. `max_workers` bounds the live workers; at the cap, new work waits in the
/// queue for the next free worker.
pub struct ElasticPool {
    shared: Arc<PoolShared>,
    // Doubles as the growth lock.
    workers: Mutex<Workers>,
    max_workers: Option<usize>,
    spawner: Box<Spawner>,
}

#[derive(Default)]
struct Workers {
    live: Vec<ElasticWorker>,
    // Numbers thread names, so a replacement never reuses a dead worker's name.
    spawned: usize,
}

impl ElasticPool {
    pub fn new(name: &str) -> Self {
        Self::with_max_workers(name, None)
    }

    pub fn with_max_workers(name: &str, max_workers: Option<usize>) -> Self {
        Self::with_spawner(name, max_workers, default_spawner())
    }

    pub(crate) fn with_spawner(
        name: &str,
        max_workers: Option<usize>,
        spawner: Box<Spawner>,
    ) -> Self {
        Self {
            shared: PoolShared::new(name),
            workers: Mutex::new(Workers::default()),
            max_workers: max_workers.map(|m| m.max(1)),
            spawner,
        }
    }

    /// Fire-and-forget. A panic in `task` is logged and ends the worker which ran it.
    pub fn push(&self, task: Task) {
        self.ensure_idle_worker();
        self.shared.queue.push(task);
    }

    pub fn checked_push<F, T>(&self, f: F) -> CompletionHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = checked_task(f);
        self.push(task);
        handle
    }

    /// Number of workers which have not exited.
    pub fn worker_count(&self) -> usize {
        let mut workers = self.workers.lock().unwrap();
        self.reap(&mut workers);
        workers.live.len()
    }

    pub fn idle_worker_count(&self) -> usize {
        let mut workers = self.workers.lock().unwrap();
        self.reap(&mut workers);
        workers
            .live
            .iter()
            .filter(|w| !w.busy.load(Ordering::Acquire))
            .count()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Join workers which exited after a task panic.
    fn reap(&self, workers: &mut Workers) {
        let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(&mut workers.live)
            .into_iter()
            .partition(|w| w.handle.is_finished());
        workers.live = live;
        for worker in dead {
            if worker.handle.join().is_err() {
                warn!(pool = %self.shared.name, "Worker thread exited abnormally");
            }
        }
    }

    fn ensure_idle_worker(&self) {
        let mut workers = self.workers.lock().unwrap();
        self.reap(&mut workers);
        if workers
            .live
            .iter()
            .any(|w| !w.busy.load(Ordering::Acquire))
        {
            return;
        }
        if let Some(max) = self.max_workers
            && workers.live.len() >= max
        {
            debug!(pool = %self.shared.name, max, "Worker cap reached; task will wait");
            return;
        }

        let index = workers.spawned;
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = busy.clone();
        let worker_shared = self.shared.clone();
        match (self.spawner)(
            format!("{} {index}", self.shared.name),
            Box::new(move || worker_loop(&worker_shared, Some(&worker_busy))),
        ) {
            Ok(handle) => {
                workers.spawned += 1;
                workers.live.push(ElasticWorker { busy, handle });
                debug!(
                    pool = %self.shared.name,
                    workers = workers.live.len(),
                    "Spawned elastic worker"
                );
            }
            Err(_) if workers.live.is_empty() => {
                warn!(
                    pool = %self.shared.name,
                    "No workers available; queued tasks will run at pool shutdown"
                );
            }
            Err(_) => {}
        }
    }
}

impl Drop for ElasticPool {
    fn drop(&mut self) {
        let workers = std::mem::take(&mut self.workers.lock().unwrap().live);
        self.shared
            .shutdown(workers.into_iter().map(|w| w.handle).collect());
    }
}
