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

//! Staging files and the triple-rename commit.
//!
//! A save never overwrites a stable file in place. It writes `D.ndt`, then commits:
//!
//! 1. delete `D.bak`, if present;
//! 2. rename `D.txt` to `D.bak`, if present;
//! 3. rename `D.ndt` to `D.txt`.
//!
//! After any prefix of these steps, `D.txt` or `D.bak` holds a complete committed snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::domain::{BACKUP_EXT, STABLE_EXT, STAGING_EXT};

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("unable to remove {path}: {source}")]
    RemoveBackup { path: PathBuf, source: io::Error },
    #[error("unable to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("unable to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// The staging / stable / backup paths for one file stem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triad {
    pub staging: PathBuf,
    pub stable: PathBuf,
    pub backup: PathBuf,
}

impl Triad {
    pub fn new(data_dir: &Path, stem: &str) -> Self {
        Self {
            staging: data_dir.join(format!("{stem}.{STAGING_EXT}")),
            stable: data_dir.join(format!("{stem}.{STABLE_EXT}")),
            backup: data_dir.join(format!("{stem}.{BACKUP_EXT}")),
        }
    }

    /// Create or truncate the staging file, write `contents`, and sync it to disk.
    pub fn write_staging(&self, contents: &[u8]) -> Result<(), CommitError> {
        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.staging)?;
            file.write_all(contents)?;
            file.sync_all()
        };
        write().map_err(|source| CommitError::Write {
            path: self.staging.clone(),
            source,
        })
    }

    /// Run the three commit steps. A failing step is logged and the remaining steps are skipped.
    pub fn commit(&self) -> Result<(), CommitError> {
        let result = self.commit_steps();
        if let Err(e) = &result {
            error!(staging = ?self.staging, error = %e, os_error = ?os_error(e), "Commit failed");
        }
        result
    }

    fn commit_steps(&self) -> Result<(), CommitError> {
        if self.backup.exists() {
            fs::remove_file(&self.backup).map_err(|source| CommitError::RemoveBackup {
                path: self.backup.clone(),
                source,
            })?;
        }
        if self.stable.exists() {
            rename(&self.stable, &self.backup)?;
        }
        rename(&self.staging, &self.stable)?;
        sync_parent(&self.stable);
        debug!(stable = ?self.stable, "Committed");
        Ok(())
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), CommitError> {
    fs::rename(from, to).map_err(|source| CommitError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

fn os_error(e: &CommitError) -> Option<i32> {
    match e {
        CommitError::RemoveBackup { source, .. }
        | CommitError::Rename { source, .. }
        | CommitError::Write { source, .. } => source.raw_os_error(),
    }
}

/// Make the renames durable where the platform allows syncing a directory.
fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent()
        && let Ok(dir) = File::open(dir)
    {
        let _ = dir.sync_all();
    }
}
