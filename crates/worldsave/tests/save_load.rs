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

//! Saving a world and reading it back.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use hearth_worldsave::incremental::{committed_generations, data_path};
use hearth_worldsave::{
    Domain, LoadError, MemoryWorld, Record, SERIAL_KEY, SaveConfig, SaveKind, SaveOrchestrator,
    Serial, load_world,
};
use pretty_assertions::assert_eq;

fn populate(world: &MemoryWorld) {
    world
        .insert(
            Domain::Pcs,
            Record::new("Character")
                .with(SERIAL_KEY, Serial(0x0000_0101))
                .with("Name", "Avatar")
                .with("Title", "")
                .with("CProp", "lastLogin i1700000000"),
        )
        .unwrap();
    world
        .insert(
            Domain::PcEquip,
            Record::new("Item")
                .with(SERIAL_KEY, Serial(0x4000_0010))
                .with("ObjType", "0x1517")
                .with("Container", "0x101"),
        )
        .unwrap();
    world
        .insert(
            Domain::Npcs,
            Record::new("NPC")
                .with(SERIAL_KEY, Serial(0x0000_0200))
                .with("Name", "a town guard")
                .with("Script", ":guards:ai_guard"),
        )
        .unwrap();
    for i in 0..20u32 {
        world
            .insert(
                Domain::Items,
                Record::new("Item")
                    .with(SERIAL_KEY, Serial(0x4000_1000 + i))
                    .with("ObjType", "0xeed")
                    .with("Amount", i * 3 + 1),
            )
            .unwrap();
    }
    world
        .insert(
            Domain::Guilds,
            Record::new("Guild")
                .with(SERIAL_KEY, Serial(1))
                .with("Member", "0x101"),
        )
        .unwrap();
}

fn full_save(dir: &Path, world: Arc<MemoryWorld>) {
    let orchestrator = SaveOrchestrator::new(dir, SaveConfig::default(), world);
    let report = orchestrator.request_save().unwrap();
    assert!(report.is_success());
    assert!(orchestrator.wait_idle().unwrap().unwrap().is_success());
}

fn load(dir: &Path) -> MemoryWorld {
    let mut world = MemoryWorld::new();
    load_world(dir, &mut world, false).unwrap();
    world
}

#[test]
fn test_round_trip_is_byte_stable() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let world = Arc::new(MemoryWorld::new());
    populate(&world);
    full_save(first.path(), world.clone());

    let reloaded = Arc::new(load(first.path()));
    assert_eq!(reloaded.len(), world.len());
    assert_eq!(
        reloaded.get(Serial(0x101)).unwrap(),
        world.get(Serial(0x101)).unwrap()
    );
    assert_eq!(reloaded.domain_of(Serial(0x4000_0010)), Some(Domain::PcEquip));

    full_save(second.path(), reloaded);
    for domain in Domain::all() {
        let a = fs::read(domain.triad(first.path()).stable).unwrap();
        let b = fs::read(domain.triad(second.path()).stable).unwrap();
        assert_eq!(
            String::from_utf8(a).unwrap(),
            String::from_utf8(b).unwrap(),
            "{domain}"
        );
    }
}

#[test]
fn test_second_full_save_keeps_backup() {
    let dir = tempfile::tempdir().unwrap();
    let world = Arc::new(MemoryWorld::new());
    populate(&world);

    let orchestrator = SaveOrchestrator::new(dir.path(), SaveConfig::default(), world.clone());
    orchestrator.request_save().unwrap();
    world.set_property(Serial(0x200), "Name", "a retired guard");
    orchestrator.request_save().unwrap();
    orchestrator.wait_idle().unwrap().unwrap();

    let triad = Domain::Npcs.triad(dir.path());
    assert!(
        fs::read_to_string(&triad.backup)
            .unwrap()
            .contains("\tName\ta town guard\n")
    );
    assert!(
        fs::read_to_string(&triad.stable)
            .unwrap()
            .contains("\tName\ta retired guard\n")
    );
}

#[test]
fn test_incremental_saves_supersede_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let world = Arc::new(MemoryWorld::new());
    populate(&world);
    let orchestrator = SaveOrchestrator::new(dir.path(), SaveConfig::default(), world.clone());
    orchestrator.request_save().unwrap();

    // Generation 1: one change, one deletion, one creation.
    world.set_property(Serial(0x4000_1000), "Amount", 500);
    assert!(world.remove(Serial(0x4000_1001)));
    world
        .insert(
            Domain::Multis,
            Record::new("House")
                .with(SERIAL_KEY, Serial(0x4000_9000))
                .with("ObjType", "0x6b"),
        )
        .unwrap();
    let report = orchestrator.request_incremental_save().unwrap();
    assert_eq!(report.kind, SaveKind::Incremental { generation: 1 });
    assert_eq!(report.dirty_writes, 2);
    assert_eq!(report.clean_writes, 0);

    // Generation 2 rewrites the same item again.
    world.set_property(Serial(0x4000_1000), "Amount", 750);
    let report = orchestrator.request_incremental_save().unwrap();
    assert_eq!(report.kind, SaveKind::Incremental { generation: 2 });
    orchestrator.wait_idle().unwrap().unwrap();
    assert_eq!(committed_generations(dir.path()).unwrap(), vec![1, 2]);

    let text = fs::read_to_string(data_path(dir.path(), 1)).unwrap();
    assert!(text.starts_with("Section\n{\n\tDomain\tpol\n}\n\n"));
    assert!(text.contains("\tDomain\tmultis\n}\n\nHouse\n{\n"));

    let mut loaded = MemoryWorld::new();
    let report = load_world(dir.path(), &mut loaded, false).unwrap();
    assert_eq!(report.incremental_generations, 2);
    // The full-save copy of 0x40001000, its generation 1 copy, and the deleted 0x40001001.
    assert_eq!(report.records_superseded, 3);
    assert_eq!(loaded.len(), world.len());
    assert_eq!(
        loaded.get(Serial(0x4000_1000)).unwrap().get("Amount"),
        Some("750")
    );
    assert!(loaded.get(Serial(0x4000_1001)).is_none());
    assert_eq!(loaded.domain_of(Serial(0x4000_9000)), Some(Domain::Multis));
}

#[test]
fn test_full_save_retires_incremental_files() {
    let dir = tempfile::tempdir().unwrap();
    let world = Arc::new(MemoryWorld::new());
    populate(&world);
    let orchestrator = SaveOrchestrator::new(dir.path(), SaveConfig::default(), world.clone());
    orchestrator.request_save().unwrap();
    world.set_property(Serial(0x101), "Title", "Lord");
    orchestrator.request_incremental_save().unwrap();
    orchestrator.wait_idle().unwrap().unwrap();
    assert_eq!(committed_generations(dir.path()).unwrap(), vec![1]);

    orchestrator.request_save().unwrap();
    orchestrator.wait_idle().unwrap().unwrap();
    assert!(committed_generations(dir.path()).unwrap().is_empty());
    assert!(!data_path(dir.path(), 1).exists());
    assert_eq!(orchestrator.incremental_generation(), 0);

    let loaded = load(dir.path());
    assert_eq!(loaded.get(Serial(0x101)).unwrap().get("Title"), Some("Lord"));
}

#[test]
fn test_legacy_files_are_loaded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        Domain::Items.path(dir.path(), "dat"),
        "Item\n{\n\tSerial\t0x40000001\n\tObjType\t0xeed\n}\n\n",
    )
    .unwrap();

    let loaded = load(dir.path());
    assert_eq!(loaded.serials_in(Domain::Items), vec![Serial(0x4000_0001)]);
    assert!(Domain::Items.triad(dir.path()).stable.exists());
    assert!(!Domain::Items.path(dir.path(), "dat").exists());
}

#[test]
fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        Domain::Items.triad(dir.path()).stable,
        "Item\n{\n\tSerial\tnonsense\n}\n\nItem\n{\n\tObjType\t0xeed\n}\n\nItem\n{\n\tSerial\t0x40000002\n}\n\n",
    )
    .unwrap();

    let mut world = MemoryWorld::new();
    assert!(matches!(
        load_world(dir.path(), &mut world, false),
        Err(LoadError::Record { .. })
    ));

    let mut world = MemoryWorld::new();
    let report = load_world(dir.path(), &mut world, true).unwrap();
    // The unparseable serial and the record without one.
    assert_eq!(report.records_skipped, 2);
    assert_eq!(report.records_loaded, 1);
    assert_eq!(world.serials_in(Domain::Items), vec![Serial(0x4000_0002)]);
}

#[test]
fn test_empty_directory_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut world = MemoryWorld::new();
    let report = load_world(dir.path(), &mut world, false).unwrap();
    assert_eq!(report.records_loaded, 0);
    assert!(world.is_empty());
}
