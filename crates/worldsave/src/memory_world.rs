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

//! A world made of property bags, one record per entity.
//!
//! Used by the daemon when no richer object model is attached, and by tests.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use crate::domain::Domain;
use crate::record::{Record, RecordError, SERIAL_KEY, Serial};
use crate::world::{Persist, StagingWriter, WorldSink, WorldSource};

pub struct MemoryEntity {
    serial: Serial,
    domain: Domain,
    record: Record,
    dirty: AtomicBool,
}

impl MemoryEntity {
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

impl Persist for MemoryEntity {
    fn serial(&self) -> Serial {
        self.serial
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    fn write_records(&self, writer: &mut StagingWriter) -> Result<(), io::Error> {
        writer.write_record(&self.record)
    }
}

#[derive(Default)]
pub struct MemoryWorld {
    entities: RwLock<BTreeMap<Serial, MemoryEntity>>,
    deleted: Mutex<Vec<Serial>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, domain: Domain, record: Record, dirty: bool) -> Result<Serial, RecordError> {
        let serial = record
            .serial()?
            .ok_or_else(|| RecordError::MissingProperty {
                kind: record.kind().to_string(),
                key: SERIAL_KEY.to_string(),
            })?;
        self.entities.write().unwrap().insert(
            serial,
            MemoryEntity {
                serial,
                domain,
                record,
                dirty: AtomicBool::new(dirty),
            },
        );
        Ok(serial)
    }

    /// Add or replace an entity. It starts out dirty.
    pub fn insert(&self, domain: Domain, record: Record) -> Result<Serial, RecordError> {
        self.put(domain, record, true)
    }

    /// Set a property on an entity and mark it dirty. False if there is no such entity.
    pub fn set_property(&self, serial: Serial, key: &str, value: impl ToString) -> bool {
        let mut entities = self.entities.write().unwrap();
        let Some(entity) = entities.get_mut(&serial) else {
            return false;
        };
        entity.record.set(key, value);
        entity.dirty.store(true, Ordering::Release);
        true
    }

    /// Remove an entity, remembering its serial for the next incremental save.
    pub fn remove(&self, serial: Serial) -> bool {
        let removed = self.entities.write().unwrap().remove(&serial).is_some();
        if removed {
            self.deleted.lock().unwrap().push(serial);
        }
        removed
    }

    pub fn get(&self, serial: Serial) -> Option<Record> {
        self.entities
            .read()
            .unwrap()
            .get(&serial)
            .map(|e| e.record.clone())
    }

    pub fn domain_of(&self, serial: Serial) -> Option<Domain> {
        self.entities.read().unwrap().get(&serial).map(|e| e.domain)
    }

    pub fn is_dirty(&self, serial: Serial) -> Option<bool> {
        self.entities
            .read()
            .unwrap()
            .get(&serial)
            .map(Persist::is_dirty)
    }

    pub fn mark_clean(&self, serial: Serial) {
        if let Some(entity) = self.entities.read().unwrap().get(&serial) {
            entity.clear_dirty();
        }
    }

    pub fn serials_in(&self, domain: Domain) -> Vec<Serial> {
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|e| e.domain == domain)
            .map(|e| e.serial)
            .collect()
    }

    /// Apply `f` to every entity's record, marking each dirty.
    pub fn update_all(&self, mut f: impl FnMut(&mut Record)) {
        for entity in self.entities.write().unwrap().values_mut() {
            f(&mut entity.record);
            entity.dirty.store(true, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.entities.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorldSource for MemoryWorld {
    fn for_each_entity(
        &self,
        domain: Domain,
        visit: &mut dyn FnMut(&dyn Persist) -> Result<(), io::Error>,
    ) -> Result<(), io::Error> {
        let entities = self.entities.read().unwrap();
        for entity in entities.values().filter(|e| e.domain == domain) {
            visit(entity)?;
        }
        Ok(())
    }

    fn take_deleted(&self) -> Vec<Serial> {
        std::mem::take(&mut *self.deleted.lock().unwrap())
    }

    fn requeue_deleted(&self, serials: Vec<Serial>) {
        let entities = self.entities.read().unwrap();
        let mut deleted = self.deleted.lock().unwrap();
        // Anything recreated since has a live record to save instead.
        let returned: Vec<_> = serials
            .into_iter()
            .filter(|serial| !entities.contains_key(serial) && !deleted.contains(serial))
            .collect();
        deleted.splice(0..0, returned);
    }

    fn entity_count(&self) -> usize {
        self.len()
    }
}

impl WorldSink for MemoryWorld {
    /// Loaded entities start out clean.
    fn populate(&mut self, domain: Domain, record: Record) -> Result<(), RecordError> {
        self.put(domain, record, false).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn npc(serial: u32, name: &str) -> Record {
        Record::new("NPC")
            .with(SERIAL_KEY, Serial(serial))
            .with("Name", name)
    }

    #[test]
    fn test_insert_requires_serial() {
        let world = MemoryWorld::new();
        assert!(matches!(
            world.insert(Domain::Npcs, Record::new("NPC")),
            Err(RecordError::MissingProperty { .. })
        ));
        assert!(world.is_empty());
    }

    #[test]
    fn test_set_property_marks_dirty() {
        let mut world = MemoryWorld::new();
        world.populate(Domain::Npcs, npc(0x10, "a guard")).unwrap();
        assert_eq!(world.is_dirty(Serial(0x10)), Some(false));

        assert!(world.set_property(Serial(0x10), "Name", "a sleepy guard"));
        assert_eq!(world.is_dirty(Serial(0x10)), Some(true));
        assert_eq!(
            world.get(Serial(0x10)).unwrap().get("Name"),
            Some("a sleepy guard")
        );
        assert!(!world.set_property(Serial(0x11), "Name", "nobody"));

        // Property names match case-insensitively, so this replaces rather than duplicates.
        assert!(world.set_property(Serial(0x10), "NAME", "a guard captain"));
        let record = world.get(Serial(0x10)).unwrap();
        assert_eq!(record.get("name"), Some("a guard captain"));
        assert_eq!(record.get_all("Name").count(), 1);
    }

    #[test]
    fn test_remove_tracks_deleted() {
        let world = MemoryWorld::new();
        world.insert(Domain::Npcs, npc(1, "a")).unwrap();
        world.insert(Domain::Npcs, npc(2, "b")).unwrap();
        assert!(world.remove(Serial(1)));
        assert!(!world.remove(Serial(1)));

        assert_eq!(world.take_deleted(), vec![Serial(1)]);
        assert!(world.take_deleted().is_empty());
        assert_eq!(world.serials_in(Domain::Npcs), vec![Serial(2)]);
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_requeue_deleted_skips_recreated() {
        let world = MemoryWorld::new();
        for serial in 1..=3 {
            world.insert(Domain::Npcs, npc(serial, "x")).unwrap();
            world.remove(Serial(serial));
        }
        let taken = world.take_deleted();
        world.insert(Domain::Npcs, npc(2, "back again")).unwrap();
        world.insert(Domain::Npcs, npc(4, "y")).unwrap();
        world.remove(Serial(4));

        world.requeue_deleted(taken);
        assert_eq!(world.take_deleted(), vec![Serial(1), Serial(3), Serial(4)]);
    }

    #[test]
    fn test_for_each_entity_filters_domain() {
        let world = MemoryWorld::new();
        world.insert(Domain::Npcs, npc(1, "a")).unwrap();
        world.insert(Domain::Pcs, npc(2, "b")).unwrap();

        let mut seen = vec![];
        world
            .for_each_entity(Domain::Pcs, &mut |e: &dyn Persist| {
                seen.push(e.serial());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![Serial(2)]);
        assert_eq!(world.domain_of(Serial(1)), Some(Domain::Npcs));
    }
}
