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

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::tasks::Task;

/// Returned from [`TaskQueue::pop_wait`] once the queue has been canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task queue canceled")]
pub struct Canceled;

struct QueueState {
    tasks: VecDeque<Task>,
    canceled: bool,
}

/// A blocking FIFO of tasks shared between the producers and workers of one pool.
///
/// Tasks are handed out in push order. After [`TaskQueue::cancel`], blocked and future
/// `pop_wait` callers get [`Canceled`] instead of a task; whatever is still queued at that point
/// is collected with [`TaskQueue::pop_remaining`] so that it still runs.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                canceled: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue a task. Never blocks beyond the internal lock, and wakes one waiting consumer.
    pub fn push(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state.tasks.push_back(task);
        drop(state);
        self.available.notify_one();
    }

    /// Block until a task is available, or the queue is canceled.
    pub fn pop_wait(&self) -> Result<Task, Canceled> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.canceled {
                return Err(Canceled);
            }
            if let Some(task) = state.tasks.pop_front() {
                return Ok(task);
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Mark the queue canceled and wake every blocked consumer. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.canceled = true;
        drop(state);
        self.available.notify_all();
    }

    /// Take everything currently queued, without blocking.
    pub fn pop_remaining(&self) -> Vec<Task> {
        let mut state = self.state.lock().unwrap();
        state.tasks.drain(..).collect()
    }

    pub fn is_canceled(&self) -> bool {
        self.state.lock().unwrap().canceled
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn recording_task(log: &Arc<Mutex<Vec<usize>>>, n: usize) -> Task {
        let log = log.clone();
        Box::new(move || log.lock().unwrap().push(n))
    }

    #[test]
    fn test_fifo_order() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(vec![]));
        for n in 0..5 {
            queue.push(recording_task(&log, n));
        }
        assert_eq!(queue.len(), 5);
        for _ in 0..5 {
            (queue.pop_wait().unwrap())();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_wait_blocks_until_push() {
        let queue = Arc::new(TaskQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let task = queue.pop_wait().unwrap();
                task();
            })
        };

        thread::sleep(Duration::from_millis(20));
        let r = ran.clone();
        queue.push(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        consumer.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_wakes_all_blocked_consumers() {
        const WAITERS: usize = 8;
        let queue = Arc::new(TaskQueue::new());
        let started = Arc::new(Barrier::new(WAITERS + 1));

        let waiters: Vec<_> = (0..WAITERS)
            .map(|_| {
                let queue = queue.clone();
                let started = started.clone();
                thread::spawn(move || {
                    started.wait();
                    queue.pop_wait().map(|_| ())
                })
            })
            .collect();

        started.wait();
        thread::sleep(Duration::from_millis(20));
        queue.cancel();

        for w in waiters {
            assert_eq!(w.join().unwrap(), Err(Canceled));
        }
        assert!(queue.is_canceled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let queue = TaskQueue::new();
        queue.cancel();
        queue.cancel();
        assert!(queue.pop_wait().is_err());
    }

    #[test]
    fn test_canceled_queue_keeps_tasks_for_drain() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(vec![]));
        queue.push(recording_task(&log, 1));
        queue.push(recording_task(&log, 2));
        queue.cancel();

        assert!(queue.pop_wait().is_err());
        let remaining = queue.pop_remaining();
        assert_eq!(remaining.len(), 2);
        for task in remaining {
            task();
        }
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert!(queue.pop_remaining().is_empty());
    }
}
