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

//! Process-wide registry of named threads, used for diagnostics.
//!
//! Every thread started through [`spawn_named`] registers itself for its lifetime, and the
//! registry keeps a count of threads that have been requested but have not yet exited. If the OS
//! refuses to create a thread, the count is corrected so that the accounting never includes
//! phantom workers.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::error;

lazy_static! {
    static ref THREAD_REGISTRY: ThreadRegistry = ThreadRegistry::new();
}

/// The process-wide registry.
pub fn thread_registry() -> &'static ThreadRegistry {
    &THREAD_REGISTRY
}

pub struct ThreadRegistry {
    names: Mutex<HashMap<ThreadId, String>>,
    expected: AtomicUsize,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
            expected: AtomicUsize::new(0),
        }
    }

    /// Register the calling thread under `name` until the returned guard is dropped.
    pub fn register(&self, name: impl Into<String>) -> ThreadRegistration<'_> {
        let id = thread::current().id();
        self.names.lock().unwrap().insert(id, name.into());
        ThreadRegistration { registry: self, id }
    }

    fn unregister(&self, id: ThreadId) {
        self.names.lock().unwrap().remove(&id);
    }

    pub fn name_of(&self, id: ThreadId) -> Option<String> {
        self.names.lock().unwrap().get(&id).cloned()
    }

    /// Names of the registered threads, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.names.lock().unwrap().values().cloned().collect();
        names.sort();
        names
    }

    /// Number of threads started through [`spawn_named`] which have not yet exited.
    pub fn expected_threads(&self) -> usize {
        self.expected.load(Ordering::SeqCst)
    }
}

/// Keeps the calling thread registered. Unregisters on drop.
pub struct ThreadRegistration<'a> {
    registry: &'a ThreadRegistry,
    id: ThreadId,
}

impl Drop for ThreadRegistration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Decrements the expected-thread count when the spawned thread exits, even by panic.
struct ExpectedThread(&'static ThreadRegistry);

impl Drop for ExpectedThread {
    fn drop(&mut self) {
        self.0.expected.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawn a named, joinable thread which is registered in the process-wide registry for the
/// duration of `f`.
///
/// On failure the OS error is logged, the expected-thread count is restored, and the error is
/// returned to the caller to decide whether it can carry on with fewer threads.
pub fn spawn_named<F>(name: impl Into<String>, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    spawn_named_with(thread::Builder::new(), name, f)
}

/// [`spawn_named`] from a preconfigured builder, e.g. one with a stack size. The builder's name
/// is replaced.
pub fn spawn_named_with<F>(
    builder: thread::Builder,
    name: impl Into<String>,
    f: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let registry = thread_registry();
    let name = name.into();
    registry.expected.fetch_add(1, Ordering::SeqCst);

    let thread_name = name.clone();
    let result = builder.name(name.clone()).spawn(move || {
        let _expected = ExpectedThread(registry);
        let _registration = registry.register(thread_name);
        f()
    });

    result.inspect_err(|e| {
        registry.expected.fetch_sub(1, Ordering::SeqCst);
        error!(
            thread = %name,
            os_error = ?e.raw_os_error(),
            expected_threads = registry.expected_threads(),
            "Error in thread creation: {e}"
        );
    })
}
