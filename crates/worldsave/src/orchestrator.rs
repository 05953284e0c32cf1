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

//! World snapshots.
//!
//! A snapshot goes `idle -> critical phase -> async flush -> committed`. During the critical phase
//! every domain is serialized in parallel into memory, and the caller of
//! [`SaveOrchestrator::request_save`] blocks; it must hold the world lock for that time, so the
//! writers see a world nobody is mutating. Once the buffers are complete the caller gets its
//! [`SaveReport`] and goes back to mutating the world, while a snapshot thread writes the staging
//! files and commits them.
//!
//! Only one snapshot is in flight at a time: a new request first waits for the previous snapshot
//! to be fully committed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hearth_common::util::{is_fault_reported, spawn_named};
use hearth_kernel::{CompletionHandle, Completer, FixedPool, TaskError, completion_pair};
use tracing::{error, info, warn};

use crate::config::SaveConfig;
use crate::domain::Domain;
use crate::incremental::{
    FULL_SAVE_GENERATION, IncrementalFiles, IncrementalIndex, committed_generations,
    remove_incremental_files,
};
use crate::record::Serial;
use crate::session::{DomainCounts, SaveSession, write_domain};
use crate::world::WorldSource;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("saves are inhibited by configuration")]
    Inhibited,
    #[error("saves are disabled after a fatal fault")]
    Faulted,
    #[error("could not start snapshot thread: {0}")]
    Spawn(std::io::Error),
    #[error("could not prepare save buffers: {0}")]
    Session(std::io::Error),
    #[error("snapshot failed: {0}")]
    Snapshot(TaskError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SaveKind {
    Full,
    Incremental { generation: u32 },
}

/// What the critical phase produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CriticalOutcome {
    pub failed_domains: Vec<Domain>,
    pub clean_writes: usize,
    pub dirty_writes: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReport {
    pub kind: SaveKind,
    pub clean_writes: usize,
    pub dirty_writes: usize,
    pub failed_domains: Vec<Domain>,
    pub elapsed: Duration,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failed_domains.is_empty()
    }
}

struct SnapshotContext {
    data_dir: PathBuf,
    world: Arc<dyn WorldSource>,
    pool: FixedPool,
    index: Mutex<IncrementalIndex>,
}

pub struct SaveOrchestrator {
    config: SaveConfig,
    context: Arc<SnapshotContext>,
    // Completion of the most recent snapshot. Held across the wait for it, so it doubles as the
    // gate admitting one snapshot at a time.
    last_snapshot: Mutex<Option<CompletionHandle<SaveReport>>>,
}

impl SaveOrchestrator {
    pub fn new(data_dir: &Path, config: SaveConfig, world: Arc<dyn WorldSource>) -> Self {
        // Continue numbering after any incremental generations still on disk.
        let index = IncrementalIndex::load_from_dir(data_dir).unwrap_or_else(|(path, e)| {
            let mut index = IncrementalIndex::new();
            let last = committed_generations(data_dir)
                .ok()
                .and_then(|generations| generations.last().copied())
                .unwrap_or(FULL_SAVE_GENERATION);
            index.advance_to(last);
            warn!(
                ?path,
                error = %e,
                generation = last,
                "Could not read incremental index; numbering from the last generation on disk"
            );
            index
        });
        let pool = FixedPool::with_workers(config.writer_thread_count(), "save writer");
        Self {
            config,
            context: Arc::new(SnapshotContext {
                data_dir: data_dir.to_path_buf(),
                world,
                pool,
                index: Mutex::new(index),
            }),
            last_snapshot: Mutex::new(None),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.context.data_dir
    }

    /// The generation of the most recent committed incremental save.
    pub fn incremental_generation(&self) -> u32 {
        self.context.index.lock().unwrap().generation()
    }

    /// Snapshot every domain. Returns once the critical phase is over.
    pub fn request_save(&self) -> Result<SaveReport, SaveError> {
        self.request(false)
    }

    /// Snapshot only the entities dirtied (or deleted) since the last save.
    pub fn request_incremental_save(&self) -> Result<SaveReport, SaveError> {
        self.request(true)
    }

    /// Wait for the most recent snapshot to be committed, and return its final report.
    pub fn wait_idle(&self) -> Option<Result<SaveReport, TaskError>> {
        let mut last = self.last_snapshot.lock().unwrap();
        last.take().map(CompletionHandle::wait)
    }

    fn request(&self, incremental: bool) -> Result<SaveReport, SaveError> {
        let mut last = self.last_snapshot.lock().unwrap();
        if let Some(previous) = last.take()
            && let Err(e) = previous.wait()
        {
            error!(error = %e, "Previous snapshot did not complete");
        }

        if self.config.inhibit_saves {
            return Err(SaveError::Inhibited);
        }
        if is_fault_reported() {
            return Err(SaveError::Faulted);
        }

        let start = Instant::now();
        let kind = if incremental {
            SaveKind::Incremental {
                generation: self.incremental_generation() + 1,
            }
        } else {
            SaveKind::Full
        };
        let session = match kind {
            SaveKind::Full => SaveSession::full(self.context.world.as_ref()),
            SaveKind::Incremental { .. } => SaveSession::incremental(),
        }
        .map_err(SaveError::Session)?;

        let (critical_tx, critical_rx) = completion_pair::<CriticalOutcome>();
        let (done_tx, done_rx) = completion_pair::<SaveReport>();
        let context = self.context.clone();
        spawn_named("save snapshot", move || {
            let report = context.run_snapshot(kind, session, start, critical_tx);
            done_tx.complete(Ok(report));
        })
        .map_err(SaveError::Spawn)?;
        *last = Some(done_rx);
        drop(last);

        let outcome = critical_rx.wait().map_err(SaveError::Snapshot)?;
        Ok(SaveReport {
            kind,
            clean_writes: outcome.clean_writes,
            dirty_writes: outcome.dirty_writes,
            failed_domains: outcome.failed_domains,
            elapsed: start.elapsed(),
        })
    }
}

impl SnapshotContext {
    fn run_snapshot(
        &self,
        kind: SaveKind,
        mut session: SaveSession,
        start: Instant,
        critical: Completer<CriticalOutcome>,
    ) -> SaveReport {
        info!(?kind, "Starting world save");
        let dirty_only = matches!(kind, SaveKind::Incremental { .. });

        // Fan out: one task per domain.
        let mut pending = vec![];
        for domain in session.domains() {
            let Some(mut writer) = session.lend(domain) else {
                continue;
            };
            let world = self.world.clone();
            let handle = self.pool.checked_push(move || {
                write_domain(world.as_ref(), domain, &mut writer, dirty_only)
                    .map(|counts| (writer, counts))
            });
            pending.push((domain, handle));
        }

        // Fan in.
        let mut failed = BTreeSet::new();
        let mut totals = DomainCounts::default();
        for (domain, handle) in pending {
            match handle.wait() {
                Ok(Ok((writer, counts))) => {
                    session.restore(domain, writer);
                    totals.absorb(counts);
                }
                Ok(Err(e)) => {
                    error!(%domain, error = %e, "Failed to store domain");
                    failed.insert(domain);
                }
                Err(e) => {
                    error!(%domain, error = %e, "Domain writer failed");
                    failed.insert(domain);
                }
            }
        }
        let deleted = self.world.take_deleted();

        let critical_failures: Vec<_> = failed.iter().copied().collect();
        critical.complete(Ok(CriticalOutcome {
            failed_domains: critical_failures,
            clean_writes: totals.clean,
            dirty_writes: totals.dirty,
        }));

        // The world may be mutated again from here on; everything below works on the buffers.
        match kind {
            SaveKind::Full => self.commit_full(session, deleted, &mut failed),
            SaveKind::Incremental { generation } => {
                self.commit_incremental(generation, session, &totals.serials, &deleted, &mut failed)
            }
        }

        let report = SaveReport {
            kind,
            clean_writes: totals.clean,
            dirty_writes: totals.dirty,
            failed_domains: failed.into_iter().collect(),
            elapsed: start.elapsed(),
        };
        if report.is_success() {
            info!(
                ?kind,
                clean = report.clean_writes,
                dirty = report.dirty_writes,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "World save complete"
            );
        } else {
            error!(
                ?kind,
                failed = ?report.failed_domains,
                clean = report.clean_writes,
                dirty = report.dirty_writes,
                "World save incomplete"
            );
        }
        report
    }

    fn commit_full(
        &self,
        session: SaveSession,
        deleted: Vec<Serial>,
        failed: &mut BTreeSet<Domain>,
    ) {
        let (flushed, flush_failed) = session.flush(&self.data_dir);
        failed.extend(flush_failed);
        for domain in flushed {
            if domain.triad(&self.data_dir).commit().is_err() {
                failed.insert(domain);
            }
        }

        // Incremental generations are retired even if some domains failed. A failed domain's old
        // file may still hold deleted entities, so the next save must record those deletions.
        if !failed.is_empty() {
            warn!(
                failed = ?failed,
                deletions = deleted.len(),
                "Full save incomplete; failed domains keep their previous snapshot"
            );
            self.world.requeue_deleted(deleted);
        }
        match remove_incremental_files(&self.data_dir) {
            Ok(_) => self.index.lock().unwrap().clear(),
            Err(e) => error!(error = %e, "Could not remove incremental save files"),
        }
    }

    fn commit_incremental(
        &self,
        generation: u32,
        session: SaveSession,
        modified: &[Serial],
        deleted: &[Serial],
        failed: &mut BTreeSet<Domain>,
    ) {
        let index = match IncrementalFiles::render_index(modified, deleted) {
            Ok(index) => index,
            Err(e) => {
                error!(generation, error = %e, "Could not render incremental index");
                failed.extend(Domain::all());
                self.world.requeue_deleted(deleted.to_vec());
                return;
            }
        };
        let files = IncrementalFiles {
            generation,
            data: session.concatenate(),
            index,
        };
        if let Err(e) = files.commit(&self.data_dir) {
            error!(generation, error = %e, "Could not commit incremental save");
            failed.extend(Domain::all());
            self.world.requeue_deleted(deleted.to_vec());
            return;
        }

        let mut index = self.index.lock().unwrap();
        for serial in modified {
            index.record(*serial, generation);
        }
        for serial in deleted {
            index.record_deleted(*serial, generation);
        }
    }
}
