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

//! The daemon's threads: the main loop, which owns the world between pulses, and the tasks
//! thread, which runs saves on schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hearth_common::util::spawn_named;
use hearth_kernel::pulse::{tasks_thread_sleep, wait_for_pulse, wake_tasks_thread};
use hearth_kernel::{ElasticPool, world_lock};
use hearth_worldsave::{SaveConfig, SaveError, SaveOrchestrator, SaveReport};
use tracing::{debug, error, info, warn};

use crate::config::Config;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScheduledSave {
    Full,
    Incremental,
}

/// When the next full and incremental saves are due.
#[derive(Debug)]
pub struct SaveSchedule {
    full_every: Duration,
    incremental_every: Option<Duration>,
    next_full: Instant,
    next_incremental: Option<Instant>,
}

impl SaveSchedule {
    pub fn new(config: &SaveConfig, now: Instant) -> Self {
        let full_every = Duration::from_secs(config.interval_seconds.max(1));
        let incremental_every = config
            .incremental_interval_seconds
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        Self {
            full_every,
            incremental_every,
            next_full: now + full_every,
            next_incremental: incremental_every.map(|every| now + every),
        }
    }

    /// The save due at `now`, if any, rescheduling it. A due full save also pushes the next
    /// incremental save back, since it covers everything the incremental would have written.
    pub fn due(&mut self, now: Instant) -> Option<ScheduledSave> {
        if now >= self.next_full {
            self.next_full = now + self.full_every;
            self.next_incremental = self.incremental_every.map(|every| now + every);
            return Some(ScheduledSave::Full);
        }
        if let (Some(next), Some(every)) = (self.next_incremental, self.incremental_every)
            && now >= next
        {
            self.next_incremental = Some(now + every);
            return Some(ScheduledSave::Incremental);
        }
        None
    }

    /// How long until the next save falls due.
    pub fn until_next(&self, now: Instant) -> Duration {
        let next = match self.next_incremental {
            Some(incremental) => incremental.min(self.next_full),
            None => self.next_full,
        };
        next.saturating_duration_since(now)
    }
}

pub struct Server {
    config: Config,
    orchestrator: Arc<SaveOrchestrator>,
    background: Arc<ElasticPool>,
    kill_switch: Arc<AtomicBool>,
}

impl Server {
    pub fn new(
        config: Config,
        orchestrator: SaveOrchestrator,
        kill_switch: Arc<AtomicBool>,
    ) -> Self {
        let background =
            ElasticPool::with_max_workers("background", config.pools.max_elastic_workers);
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            background: Arc::new(background),
            kill_switch,
        }
    }

    /// Run one save with the world locked, then hand the wait for its commit to a background
    /// worker so the caller is free as soon as the critical phase ends.
    pub fn save(&self, kind: ScheduledSave) -> Result<SaveReport, SaveError> {
        let report = {
            let _world = world_lock().acquire();
            match kind {
                ScheduledSave::Full => self.orchestrator.request_save(),
                ScheduledSave::Incremental => self.orchestrator.request_incremental_save(),
            }
        }?;
        info!(
            kind = ?report.kind,
            clean = report.clean_writes,
            dirty = report.dirty_writes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "World snapshot taken"
        );

        let orchestrator = self.orchestrator.clone();
        self.background.push(Box::new(move || match orchestrator.wait_idle() {
            Some(Ok(report)) if report.is_success() => {
                debug!(kind = ?report.kind, "Snapshot committed")
            }
            Some(Ok(report)) => {
                warn!(failed = ?report.failed_domains, "Snapshot committed with failed domains")
            }
            Some(Err(e)) => error!(error = %e, "Snapshot thread failed"),
            None => {}
        }));
        Ok(report)
    }

    /// The tasks thread: sleeps until a save is due or it is pulsed, runs whatever is due.
    pub fn spawn_tasks_thread(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let server = self.clone();
        spawn_named("tasks", move || {
            let mut schedule = SaveSchedule::new(&server.config.save, Instant::now());
            let tick = server.config.runtime.tick();
            while !server.kill_switch.load(Ordering::SeqCst) {
                let Some(kind) = schedule.due(Instant::now()) else {
                    tasks_thread_sleep(schedule.until_next(Instant::now()).min(tick));
                    continue;
                };
                match server.save(kind) {
                    Ok(_) => {}
                    Err(SaveError::Inhibited) => debug!(?kind, "Scheduled save inhibited"),
                    Err(e) => error!(?kind, error = %e, "Scheduled save failed"),
                }
            }
            info!("Tasks thread exiting");
        })
    }

    /// The main loop: idles on the main-loop pulse until the kill switch is thrown. Signal
    /// delivery pulses it, so shutdown does not wait out a tick.
    pub fn run_main_loop(&self) {
        let tick = self.config.runtime.tick();
        while !self.kill_switch.load(Ordering::SeqCst) {
            wait_for_pulse(tick);
        }
        info!("Main loop exiting");
        wake_tasks_thread();
    }

    /// Save once more and wait for it to be committed.
    pub fn final_save(&self) -> Result<(), SaveError> {
        let result = self.save(ScheduledSave::Full);
        // Whatever the background worker has not yet claimed.
        if let Some(Err(e)) = self.orchestrator.wait_idle() {
            error!(error = %e, "Final snapshot thread failed");
        }
        match &result {
            Ok(report) if !report.is_success() => {
                warn!(failed = ?report.failed_domains, "Final save incomplete")
            }
            Ok(_) => info!("Final save complete"),
            Err(SaveError::Inhibited) => info!("Saves inhibited; not saving on exit"),
            Err(e) => error!(error = %e, "Final save failed"),
        }
        match result {
            Err(SaveError::Inhibited) | Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
