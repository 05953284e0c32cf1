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

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use hearth_common::build;
use tracing::error;

use crate::commit::CommitError;
use crate::domain::Domain;
use crate::incremental::section_record;
use crate::record::{RecordWriter, Serial};
use crate::world::{Persist, StagingWriter, WorldSource};

/// What a domain writer produced, besides its buffer.
#[derive(Debug, Default, Clone)]
pub(crate) struct DomainCounts {
    pub(crate) clean: usize,
    pub(crate) dirty: usize,
    pub(crate) serials: Vec<Serial>,
}

impl DomainCounts {
    pub(crate) fn absorb(&mut self, other: DomainCounts) {
        self.clean += other.clean;
        self.dirty += other.dirty;
        self.serials.extend(other.serials);
    }
}

/// Serialize one domain into `writer`.
///
/// Every eligible entity is written (only dirty ones if `dirty_only`), counted as clean or dirty,
/// and has its dirty flag cleared.
pub(crate) fn write_domain(
    world: &dyn WorldSource,
    domain: Domain,
    writer: &mut StagingWriter,
    dirty_only: bool,
) -> Result<DomainCounts, io::Error> {
    let mut counts = DomainCounts::default();
    world.for_each_entity(domain, &mut |entity: &dyn Persist| {
        if !world.is_eligible(domain, entity) {
            return Ok(());
        }
        let dirty = entity.is_dirty();
        if dirty_only && !dirty {
            return Ok(());
        }
        entity.write_records(writer)?;
        if dirty {
            counts.dirty += 1;
        } else {
            counts.clean += 1;
        }
        counts.serials.push(entity.serial());
        entity.clear_dirty();
        Ok(())
    })?;
    Ok(counts)
}

/// One staging writer per domain for the duration of a snapshot.
///
/// Writers are lent out to the domain tasks and handed back on success; a domain whose writer
/// never comes back has failed and is neither flushed nor committed.
pub(crate) struct SaveSession {
    writers: BTreeMap<Domain, StagingWriter>,
}

impl SaveSession {
    /// Writers for a full save, each opened with its domain's header.
    pub(crate) fn full(world: &dyn WorldSource) -> Result<Self, io::Error> {
        let mut writers = BTreeMap::new();
        for domain in Domain::all() {
            let mut writer = RecordWriter::new(vec![]);
            if domain == Domain::Pol {
                writer.write_comment_block(&[
                    format!("Created by Version: hearth {}", build::PKG_VERSION),
                    format!("Entities: {}", world.entity_count()),
                ])?;
            } else {
                writer.write_comment_block(domain.header())?;
            }
            writers.insert(domain, writer);
        }
        Ok(Self { writers })
    }

    /// Writers for an incremental save, each opened with its domain's section marker.
    pub(crate) fn incremental() -> Result<Self, io::Error> {
        let mut writers = BTreeMap::new();
        for domain in Domain::all() {
            let mut writer = RecordWriter::new(vec![]);
            writer.write_record(&section_record(domain))?;
            writers.insert(domain, writer);
        }
        Ok(Self { writers })
    }

    pub(crate) fn domains(&self) -> Vec<Domain> {
        self.writers.keys().copied().collect()
    }

    pub(crate) fn lend(&mut self, domain: Domain) -> Option<StagingWriter> {
        self.writers.remove(&domain)
    }

    pub(crate) fn restore(&mut self, domain: Domain, writer: StagingWriter) {
        self.writers.insert(domain, writer);
    }

    /// Write each remaining buffer to its domain's staging file.
    /// Returns the domains whose staging file is complete on disk.
    pub(crate) fn flush(self, data_dir: &Path) -> (Vec<Domain>, Vec<Domain>) {
        let mut flushed = vec![];
        let mut failed = vec![];
        for (domain, writer) in self.writers {
            let triad = domain.triad(data_dir);
            match triad.write_staging(&writer.into_inner()) {
                Ok(()) => flushed.push(domain),
                Err(e) => {
                    error!(
                        %domain,
                        error = %e,
                        os_error = ?write_os_error(&e),
                        "Failed to flush domain"
                    );
                    failed.push(domain);
                }
            }
        }
        (flushed, failed)
    }

    /// Concatenate the remaining buffers in domain order.
    pub(crate) fn concatenate(self) -> Vec<u8> {
        self.writers
            .into_values()
            .flat_map(RecordWriter::into_inner)
            .collect()
    }
}

fn write_os_error(e: &CommitError) -> Option<i32> {
    match e {
        CommitError::Write { source, .. } => source.raw_os_error(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_world::MemoryWorld;
    use crate::record::Record;

    fn item(serial: u32) -> Record {
        Record::new("Item")
            .with("Serial", Serial(serial))
            .with("ObjType", "0x1f03")
    }

    #[test]
    fn test_full_session_headers() {
        let world = MemoryWorld::new();
        let session = SaveSession::full(&world).unwrap();
        let text = String::from_utf8(session.concatenate()).unwrap();
        assert!(text.starts_with("#\n#  Created by Version: hearth "));
        assert!(text.contains("#  Entities: 0\n"));
        assert!(text.contains("#  PCS.TXT: Player-Character Data\n#\n#  In addition"));
        assert!(text.contains("#  PARTIES.TXT: Party Data\n#\n\n"));
    }

    #[test]
    fn test_write_domain_counts_and_clears() {
        let world = MemoryWorld::new();
        world.insert(Domain::Items, item(1)).unwrap();
        world.insert(Domain::Items, item(2)).unwrap();
        world.insert(Domain::Multis, item(3)).unwrap();
        world.mark_clean(Serial(2));

        let mut writer = RecordWriter::new(vec![]);
        let counts = write_domain(&world, Domain::Items, &mut writer, false).unwrap();
        assert_eq!((counts.clean, counts.dirty), (1, 1));
        assert_eq!(writer.records_written(), 2);
        assert_eq!(world.is_dirty(Serial(1)), Some(false));
        assert_eq!(world.is_dirty(Serial(3)), Some(true));
    }

    #[test]
    fn test_dirty_only() {
        let world = MemoryWorld::new();
        world.insert(Domain::Items, item(1)).unwrap();
        world.insert(Domain::Items, item(2)).unwrap();
        world.mark_clean(Serial(1));

        let mut writer = RecordWriter::new(vec![]);
        let counts = write_domain(&world, Domain::Items, &mut writer, true).unwrap();
        assert_eq!(counts.serials, vec![Serial(2)]);
        assert_eq!(writer.records_written(), 1);
        assert_eq!(world.take_deleted(), vec![]);
    }
}
