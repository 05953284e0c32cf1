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

//! Wake-up pulses: broadcast nudges with bounded waits.
//!
//! A pulse is not a queue. A signal sent while nobody is waiting is lost, and several signals sent
//! during one wait wake the waiter once. Waiters always pass a timeout and simply re-poll when it
//! expires.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Signaled,
    TimedOut,
}

pub struct Pulse {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Default for Pulse {
    fn default() -> Self {
        Self::new()
    }
}

impl Pulse {
    pub const fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Wake every thread currently waiting on this pulse.
    pub fn signal(&self) {
        let mut generation = self.generation.lock().unwrap();
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.cond.notify_all();
    }

    /// Wait for the next signal, for at most `timeout`.
    pub fn wait(&self, timeout: Duration) -> Wakeup {
        let generation = self.generation.lock().unwrap();
        let start = *generation;
        let (_generation, result) = self
            .cond
            .wait_timeout_while(generation, timeout, |g| *g == start)
            .unwrap();
        if result.timed_out() {
            Wakeup::TimedOut
        } else {
            Wakeup::Signaled
        }
    }
}

static MAIN_LOOP_PULSE: Pulse = Pulse::new();
static TASKS_PULSE: Pulse = Pulse::new();
static TRANSMIT_PULSE: Pulse = Pulse::new();

/// Wake the main loop.
pub fn send_pulse() {
    MAIN_LOOP_PULSE.signal();
}

pub fn wait_for_pulse(timeout: Duration) -> Wakeup {
    MAIN_LOOP_PULSE.wait(timeout)
}

/// Wake the background tasks thread.
pub fn wake_tasks_thread() {
    TASKS_PULSE.signal();
}

pub fn tasks_thread_sleep(timeout: Duration) -> Wakeup {
    TASKS_PULSE.wait(timeout)
}

/// Wake the outbound transmit thread.
pub fn send_transmit_pulse() {
    TRANSMIT_PULSE.signal();
}

pub fn wait_for_transmit_pulse(timeout: Duration) -> Wakeup {
    TRANSMIT_PULSE.wait(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_times_out_without_signal() {
        let pulse = Pulse::new();
        assert_eq!(pulse.wait(Duration::from_millis(10)), Wakeup::TimedOut);
    }

    #[test]
    fn test_signal_before_wait_is_missed() {
        let pulse = Pulse::new();
        pulse.signal();
        assert_eq!(pulse.wait(Duration::from_millis(10)), Wakeup::TimedOut);
    }

    #[test]
    fn test_broadcast_wakes_every_waiter() {
        const WAITERS: usize = 4;
        let pulse = Arc::new(Pulse::new());
        let ready = Arc::new(Barrier::new(WAITERS + 1));
        let waiters: Vec<_> = (0..WAITERS)
            .map(|_| {
                let (pulse, ready) = (pulse.clone(), ready.clone());
                thread::spawn(move || {
                    ready.wait();
                    pulse.wait(Duration::from_secs(10))
                })
            })
            .collect();

        ready.wait();
        while !waiters.iter().all(|w| w.is_finished()) {
            pulse.signal();
            thread::sleep(Duration::from_millis(5));
        }
        for w in waiters {
            assert_eq!(w.join().unwrap(), Wakeup::Signaled);
        }
    }

    #[test]
    #[serial]
    fn test_pulses_are_independent() {
        let waiter = thread::spawn(|| wait_for_transmit_pulse(Duration::from_millis(100)));
        thread::sleep(Duration::from_millis(20));
        send_pulse();
        wake_tasks_thread();
        assert_eq!(waiter.join().unwrap(), Wakeup::TimedOut);

        let waiter = thread::spawn(|| wait_for_pulse(Duration::from_secs(10)));
        while !waiter.is_finished() {
            send_pulse();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(waiter.join().unwrap(), Wakeup::Signaled);
    }
}
