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

//! The world lock: the one exclusive lock over the mutable world graph.
//!
//! Any thread touching world objects holds it. It is not re-entrant, and its owner is tracked so
//! that a second acquisition from the owning thread, or a release from any other thread, is
//! reported as a broken invariant instead of deadlocking or silently corrupting state.

use std::marker::PhantomData;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use hearth_common::util::{FaultPolicy, invariant_violation};
use lazy_static::lazy_static;

lazy_static! {
    static ref WORLD_LOCK: WorldLock = WorldLock::new(FaultPolicy::Abort);
}

/// The process-wide world lock.
pub fn world_lock() -> &'static WorldLock {
    &WORLD_LOCK
}

pub struct WorldLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
    policy: FaultPolicy,
}

impl WorldLock {
    pub fn new(policy: FaultPolicy) -> Self {
        Self {
            owner: Mutex::new(None),
            released: Condvar::new(),
            policy,
        }
    }

    /// Block until the lock is free, then take it for the calling thread.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap();
        if *owner == Some(me) {
            drop(owner);
            invariant_violation(self.policy, "world lock acquired twice by the same thread");
        }
        while owner.is_some() {
            owner = self.released.wait(owner).unwrap();
        }
        *owner = Some(me);
    }

    /// Release the lock. Only the owning thread may do so.
    pub fn unlock(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap();
        if *owner != Some(me) {
            drop(owner);
            invariant_violation(
                self.policy,
                "world lock released by a thread which does not own it",
            );
        }
        *owner = None;
        drop(owner);
        self.released.notify_one();
    }

    /// Take the lock for the lifetime of the returned guard.
    pub fn acquire(&self) -> WorldGuard<'_> {
        self.lock();
        WorldGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        *self.owner.lock().unwrap() == Some(thread::current().id())
    }

    pub fn is_locked(&self) -> bool {
        self.owner.lock().unwrap().is_some()
    }
}

/// Holds the world lock until dropped. Pinned to the acquiring thread.
pub struct WorldGuard<'a> {
    lock: &'a WorldLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WorldGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
