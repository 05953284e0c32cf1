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

//! Incremental saves and the index which arbitrates between them and the full save.
//!
//! Generation `N` is the `N`th incremental save since the last full save. Its files are
//! `incr-data-NNNN.txt` (the dirty records, grouped into per-domain sections) and
//! `incr-index-NNNN.txt` (every serial written or deleted by that generation). A record read at
//! generation `g` is stale if the index maps its serial to a later generation.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::commit::Triad;
use crate::domain::{Domain, STABLE_EXT, STAGING_EXT};
use crate::record::{Record, RecordError, RecordReader, RecordWriter, SERIAL_KEY, Serial};

pub const DATA_PREFIX: &str = "incr-data-";
pub const INDEX_PREFIX: &str = "incr-index-";

pub const SECTION_KIND: &str = "Section";
pub const SECTION_DOMAIN_KEY: &str = "Domain";
pub const MODIFIED_KIND: &str = "Modified";
pub const DELETED_KIND: &str = "Deleted";

/// The full save counts as generation 0.
pub const FULL_SAVE_GENERATION: u32 = 0;

pub fn data_stem(generation: u32) -> String {
    format!("{DATA_PREFIX}{generation:04}")
}

pub fn index_stem(generation: u32) -> String {
    format!("{INDEX_PREFIX}{generation:04}")
}

/// The record which opens a domain's section of an incremental data file.
pub fn section_record(domain: Domain) -> Record {
    Record::new(SECTION_KIND).with(SECTION_DOMAIN_KEY, domain)
}

/// Maps serials to the generation in which they were last written or deleted.
#[derive(Debug, Default)]
pub struct IncrementalIndex {
    generations: HashMap<Serial, u32>,
    current: u32,
}

impl IncrementalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent generation recorded.
    pub fn generation(&self) -> u32 {
        self.current
    }

    /// Note that `serial` was written (or deleted) by `generation`.
    pub fn record(&mut self, serial: Serial, generation: u32) {
        let entry = self.generations.entry(serial).or_insert(generation);
        *entry = (*entry).max(generation);
        self.current = self.current.max(generation);
    }

    /// A deletion supersedes earlier records just as a write does.
    pub fn record_deleted(&mut self, serial: Serial, generation: u32) {
        self.record(serial, generation);
    }

    /// Continue numbering after `generation`, without knowing what it wrote.
    pub fn advance_to(&mut self, generation: u32) {
        self.current = self.current.max(generation);
    }

    pub fn generation_of(&self, serial: Serial) -> Option<u32> {
        self.generations.get(&serial).copied()
    }

    /// Whether a record for `serial` read at `generation` has been superseded.
    pub fn is_superseded(&self, serial: Serial, generation: u32) -> bool {
        self.generation_of(serial).is_some_and(|g| g > generation)
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn clear(&mut self) {
        self.generations.clear();
        self.current = FULL_SAVE_GENERATION;
    }

    /// Merge the serials listed in one generation's index file.
    pub fn load_index_file(&mut self, path: &Path, generation: u32) -> Result<(), RecordError> {
        let file = File::open(path).map_err(|e| RecordError::IoError(e, 0))?;
        for record in RecordReader::new(BufReader::new(file)) {
            let record = record?;
            let deleted = match record.kind() {
                MODIFIED_KIND => false,
                DELETED_KIND => true,
                other => {
                    warn!(?path, kind = other, "Unknown record in incremental index");
                    continue;
                }
            };
            for serial in record.get_all(SERIAL_KEY) {
                let serial = Serial::from_str(serial)?;
                if deleted {
                    self.record_deleted(serial, generation);
                } else {
                    self.record(serial, generation);
                }
            }
        }
        // A generation with no serials still counts.
        self.advance_to(generation);
        Ok(())
    }

    /// Build the index from every committed generation in `data_dir`.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self, (PathBuf, RecordError)> {
        let mut index = Self::new();
        let generations = committed_generations(data_dir)
            .map_err(|e| (data_dir.to_path_buf(), RecordError::IoError(e, 0)))?;
        for generation in generations {
            let path = index_path(data_dir, generation);
            index
                .load_index_file(&path, generation)
                .map_err(|e| (path, e))?;
        }
        Ok(index)
    }
}

/// The buffers of one incremental save, before they are staged.
pub struct IncrementalFiles {
    pub generation: u32,
    pub data: Vec<u8>,
    pub index: Vec<u8>,
}

impl IncrementalFiles {
    /// Render the index file for a generation from its modified and deleted serials.
    pub fn render_index(modified: &[Serial], deleted: &[Serial]) -> Result<Vec<u8>, io::Error> {
        let mut writer = RecordWriter::new(vec![]);
        let mut modified_record = Record::new(MODIFIED_KIND);
        for serial in modified {
            modified_record.push(SERIAL_KEY, serial);
        }
        let mut deleted_record = Record::new(DELETED_KIND);
        for serial in deleted {
            deleted_record.push(SERIAL_KEY, serial);
        }
        writer.write_record(&modified_record)?;
        writer.write_record(&deleted_record)?;
        Ok(writer.into_inner())
    }

    /// Stage and commit data before index, so that an index on disk implies its data.
    pub fn commit(&self, data_dir: &Path) -> Result<(), crate::commit::CommitError> {
        let data = Triad::new(data_dir, &data_stem(self.generation));
        let index = Triad::new(data_dir, &index_stem(self.generation));
        data.write_staging(&self.data)?;
        data.commit()?;
        index.write_staging(&self.index)?;
        index.commit()
    }
}

/// Generations with a committed index file, in ascending order.
pub fn committed_generations(data_dir: &Path) -> Result<Vec<u32>, io::Error> {
    let mut generations = vec![];
    for entry in fs::read_dir(data_dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(rest) = name.strip_prefix(INDEX_PREFIX) else {
            continue;
        };
        let Some(number) = rest.strip_suffix(&format!(".{STABLE_EXT}")) else {
            continue;
        };
        if let Ok(generation) = number.parse::<u32>() {
            generations.push(generation);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

pub fn data_path(data_dir: &Path, generation: u32) -> PathBuf {
    data_dir.join(format!("{}.{STABLE_EXT}", data_stem(generation)))
}

pub fn index_path(data_dir: &Path, generation: u32) -> PathBuf {
    data_dir.join(format!("{}.{STABLE_EXT}", index_stem(generation)))
}

/// Delete every incremental file, committed or staged. Used once a full save has superseded them.
pub fn remove_incremental_files(data_dir: &Path) -> Result<usize, io::Error> {
    let mut removed = 0;
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let ours = name.starts_with(DATA_PREFIX) || name.starts_with(INDEX_PREFIX);
        let ext_ok = [STABLE_EXT, STAGING_EXT, crate::domain::BACKUP_EXT]
            .iter()
            .any(|ext| name.ends_with(&format!(".{ext}")));
        if ours && ext_ok {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "Removed incremental save files");
    }
    Ok(removed)
}
