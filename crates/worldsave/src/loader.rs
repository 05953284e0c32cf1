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

//! Startup: recovering from interrupted commits and reading the world back in.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::{error, info, span, warn};

use crate::domain::{Domain, LEGACY_EXT, STABLE_EXT};
use crate::incremental::{
    FULL_SAVE_GENERATION, IncrementalIndex, SECTION_DOMAIN_KEY, SECTION_KIND, data_path,
};
use crate::record::{Record, RecordError, RecordReader};
use crate::world::WorldSink;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(
        "{staging} exists. This probably means the system exited while writing its state. To avoid loss of data, forcing human intervention."
    )]
    InterruptedCommit { domain: Domain, staging: PathBuf },
    #[error(
        "{staging} exists but no {domain} data file or backup does. The first save never completed; forcing human intervention."
    )]
    IncompleteFirstSave { domain: Domain, staging: PathBuf },
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("error loading {path}: {source}")]
    Record { path: PathBuf, source: RecordError },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub records_loaded: usize,
    /// Records replaced by a later incremental save.
    pub records_superseded: usize,
    /// Records skipped for lacking a serial, or for failing under `ignore_load_errors`.
    pub records_skipped: usize,
    pub incremental_generations: usize,
    pub promoted_domains: Vec<Domain>,
    pub elapsed: Duration,
}

/// Inspect every domain for a staging file left behind by a crash.
///
/// A staging file next to a stable file means the crash hit before or during the commit, and it
/// may be incomplete: refuse to start. A staging file next to only a backup means the crash hit
/// between the last two commit steps; the staging file was complete, so it is promoted. A staging
/// file alone means the very first save never finished.
pub fn check_interrupted_commit(data_dir: &Path) -> Result<Vec<Domain>, LoadError> {
    let mut promoted = vec![];
    for domain in Domain::all() {
        let triad = domain.triad(data_dir);
        if !triad.staging.exists() {
            continue;
        }
        if triad.stable.exists() {
            error!(%domain, staging = ?triad.staging, "Interrupted commit detected");
            return Err(LoadError::InterruptedCommit {
                domain,
                staging: triad.staging,
            });
        }
        if !triad.backup.exists() {
            return Err(LoadError::IncompleteFirstSave {
                domain,
                staging: triad.staging,
            });
        }
        warn!(%domain, staging = ?triad.staging, "Promoting staging file left by an interrupted commit");
        fs::rename(&triad.staging, &triad.stable).map_err(|source| LoadError::Io {
            path: triad.staging.clone(),
            source,
        })?;
        promoted.push(domain);
    }
    Ok(promoted)
}

/// Rename `D.dat` files from older servers to `D.txt`.
pub fn rename_legacy_files(data_dir: &Path) -> Result<usize, LoadError> {
    let mut renamed = 0;
    for domain in Domain::all() {
        let legacy = domain.path(data_dir, LEGACY_EXT);
        if !legacy.exists() {
            continue;
        }
        let stable = domain.path(data_dir, STABLE_EXT);
        fs::rename(&legacy, &stable).map_err(|source| LoadError::Io {
            path: legacy.clone(),
            source,
        })?;
        info!(from = ?legacy, to = ?stable, "Renamed legacy data file");
        renamed += 1;
    }
    Ok(renamed)
}

struct Loader<'a> {
    sink: &'a mut dyn WorldSink,
    index: IncrementalIndex,
    ignore_load_errors: bool,
    report: LoadReport,
}

impl Loader<'_> {
    fn open(path: &Path) -> Result<RecordReader<BufReader<File>>, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(RecordReader::new(BufReader::new(file)))
    }

    /// Deal with an error on one record: skip it if configured to, else abort the load.
    fn tolerate(&mut self, path: &Path, e: RecordError) -> Result<(), LoadError> {
        if self.ignore_load_errors && !matches!(e, RecordError::IoError(..)) {
            warn!(?path, error = %e, "Ignoring load error");
            self.report.records_skipped += 1;
            return Ok(());
        }
        Err(LoadError::Record {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn load_record(
        &mut self,
        path: &Path,
        domain: Domain,
        record: Record,
        generation: u32,
    ) -> Result<(), LoadError> {
        let serial = match record.serial() {
            Ok(Some(serial)) => serial,
            Ok(None) => {
                warn!(?path, kind = record.kind(), "Skipping record without a serial");
                self.report.records_skipped += 1;
                return Ok(());
            }
            Err(e) => return self.tolerate(path, e),
        };
        if self.index.is_superseded(serial, generation) {
            self.report.records_superseded += 1;
            return Ok(());
        }
        match self.sink.populate(domain, record) {
            Ok(()) => {
                self.report.records_loaded += 1;
                Ok(())
            }
            Err(e) => self.tolerate(path, e),
        }
    }

    fn read_domain_file(&mut self, domain: Domain, path: &Path) -> Result<(), LoadError> {
        let start = Instant::now();
        let loaded_before = self.report.records_loaded;
        let mut reader = Self::open(path)?;
        loop {
            match reader.read_record() {
                Ok(Some(record)) => {
                    self.load_record(path, domain, record, FULL_SAVE_GENERATION)?
                }
                Ok(None) => break,
                Err(e) => self.tolerate(path, e)?,
            }
        }
        info!(
            %domain,
            records = self.report.records_loaded - loaded_before,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded domain"
        );
        Ok(())
    }

    fn replay_incremental(&mut self, generation: u32, path: &Path) -> Result<(), LoadError> {
        let mut reader = Self::open(path)?;
        let mut domain = None;
        loop {
            let record = match reader.read_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    self.tolerate(path, e)?;
                    continue;
                }
            };
            if record.kind() == SECTION_KIND {
                domain = match record.require(SECTION_DOMAIN_KEY).map(Domain::from_str) {
                    Ok(Ok(d)) => Some(d),
                    _ => {
                        warn!(?path, "Unknown section in incremental data; skipping it");
                        None
                    }
                };
                continue;
            }
            let Some(domain) = domain else {
                warn!(?path, kind = record.kind(), "Skipping record outside a section");
                self.report.records_skipped += 1;
                continue;
            };
            self.load_record(path, domain, record, generation)?;
        }
        info!(generation, "Replayed incremental save");
        Ok(())
    }
}

/// Read the world in `data_dir` into `sink`.
///
/// Every domain's stable file is read in domain order, then each incremental save is replayed in
/// generation order. A record whose serial was written again by a later generation is skipped
/// wherever it appears.
pub fn load_world(
    data_dir: &Path,
    sink: &mut dyn WorldSink,
    ignore_load_errors: bool,
) -> Result<LoadReport, LoadError> {
    let load_span = span!(tracing::Level::INFO, "load_world");
    let _enter = load_span.enter();
    let start = Instant::now();

    let promoted_domains = check_interrupted_commit(data_dir)?;
    rename_legacy_files(data_dir)?;

    let index = IncrementalIndex::load_from_dir(data_dir)
        .map_err(|(path, source)| LoadError::Record { path, source })?;
    let generations = crate::incremental::committed_generations(data_dir).map_err(|source| {
        LoadError::Io {
            path: data_dir.to_path_buf(),
            source,
        }
    })?;

    let mut loader = Loader {
        sink,
        index,
        ignore_load_errors,
        report: LoadReport {
            promoted_domains,
            ..Default::default()
        },
    };

    info!(?data_dir, "Reading data files");
    for domain in Domain::all() {
        let path = domain.triad(data_dir).stable;
        if path.exists() {
            loader.read_domain_file(domain, &path)?;
        }
    }

    for generation in generations {
        let path = data_path(data_dir, generation);
        if !path.exists() {
            warn!(generation, ?path, "Incremental index has no data file");
            continue;
        }
        loader.replay_incremental(generation, &path)?;
        loader.report.incremental_generations += 1;
    }

    loader.index.clear();
    let mut report = loader.report;
    report.elapsed = start.elapsed();
    info!(
        loaded = report.records_loaded,
        superseded = report.records_superseded,
        skipped = report.records_skipped,
        incremental_generations = report.incremental_generations,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "World loaded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_promotes_staging_after_backup_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let triad = Domain::Guilds.triad(dir.path());
        fs::write(&triad.backup, "old").unwrap();
        fs::write(&triad.staging, "new").unwrap();

        assert_eq!(
            check_interrupted_commit(dir.path()).unwrap(),
            vec![Domain::Guilds]
        );
        assert_eq!(fs::read_to_string(&triad.stable).unwrap(), "new");
        assert!(!triad.staging.exists());
    }

    #[test]
    fn test_staging_alongside_stable_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let triad = Domain::Items.triad(dir.path());
        fs::write(&triad.stable, "committed").unwrap();
        fs::write(&triad.staging, "half written").unwrap();

        let err = check_interrupted_commit(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::InterruptedCommit {
                domain: Domain::Items,
                ..
            }
        ));
        // Nothing was touched.
        assert!(triad.staging.exists());
    }

    #[test]
    fn test_lone_staging_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(Domain::Pcs.triad(dir.path()).staging, "").unwrap();
        assert!(matches!(
            check_interrupted_commit(dir.path()),
            Err(LoadError::IncompleteFirstSave {
                domain: Domain::Pcs,
                ..
            })
        ));
    }

    #[test]
    fn test_legacy_rename() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(Domain::Pol.path(dir.path(), LEGACY_EXT), "legacy").unwrap();
        assert_eq!(rename_legacy_files(dir.path()).unwrap(), 1);
        assert_eq!(
            fs::read_to_string(Domain::Pol.triad(dir.path()).stable).unwrap(),
            "legacy"
        );
    }
}
