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

//! The interfaces between the persistence layer and whatever owns the world objects.

use std::io;

use crate::domain::Domain;
use crate::record::{Record, RecordError, RecordWriter, Serial};

/// The in-memory buffer a domain is serialized into during the critical phase.
pub type StagingWriter = RecordWriter<Vec<u8>>;

/// A persistable world entity.
pub trait Persist {
    fn serial(&self) -> Serial;

    /// Whether the entity changed since it was last saved.
    fn is_dirty(&self) -> bool;

    /// Called once the entity has been serialized into a snapshot.
    fn clear_dirty(&self);

    /// Serialize the entity as one or more records.
    fn write_records(&self, writer: &mut StagingWriter) -> Result<(), io::Error>;
}

/// Read access to the live world, as seen by the save orchestrator.
///
/// Domain writers call into this concurrently from the save pool while the caller of
/// `request_save` holds the world lock, so no mutation happens underneath them.
pub trait WorldSource: Send + Sync {
    /// Visit every live entity of `domain`, stopping at the first error `visit` returns.
    fn for_each_entity(
        &self,
        domain: Domain,
        visit: &mut dyn FnMut(&dyn Persist) -> Result<(), io::Error>,
    ) -> Result<(), io::Error>;

    /// Whether `entity` belongs in a snapshot at all.
    fn is_eligible(&self, _domain: Domain, _entity: &dyn Persist) -> bool {
        true
    }

    /// Serials deleted since the previous call.
    fn take_deleted(&self) -> Vec<Serial>;

    /// Return deletions taken by a save that could not persist them, to be taken again next time.
    fn requeue_deleted(&self, serials: Vec<Serial>);

    /// Number of live entities across all domains. Reported in the `pol` file header.
    fn entity_count(&self) -> usize;
}

/// Write access to a world being loaded.
pub trait WorldSink {
    /// Build (or replace) the entity described by `record`.
    fn populate(&mut self, domain: Domain, record: Record) -> Result<(), RecordError>;
}
