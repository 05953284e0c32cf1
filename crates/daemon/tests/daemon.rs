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

//! Runs the daemon binary against a scratch data directory.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;

const ITEMS: &str = "Item\n{\n\tSerial\t0x40000001\n\tObjType\t0xeed\n}\n\n";

fn start_daemon(data_dir: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_hearth-daemon"))
        .arg(data_dir)
        .args(["--tick-millis", "10"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

/// Give the daemon time to load and install its signal handlers.
fn wait_until_started(data_dir: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !data_dir.join(".hearth-daemon.lock").exists() {
        assert!(Instant::now() < deadline, "daemon never started");
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(500));
}

fn terminate(child: &Child) {
    let status = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
#[serial]
fn test_saves_on_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("items.txt"), ITEMS).unwrap();

    let mut daemon = start_daemon(dir.path());
    wait_until_started(dir.path());
    terminate(&daemon);
    assert!(daemon.wait().unwrap().success());

    let pol = fs::read_to_string(dir.path().join("pol.txt")).unwrap();
    assert!(pol.contains("#  Entities: 1\n"));
    let items = fs::read_to_string(dir.path().join("items.txt")).unwrap();
    assert!(items.ends_with(ITEMS));
    // The file the daemon started from is kept as the backup.
    assert_eq!(
        fs::read_to_string(dir.path().join("items.bak")).unwrap(),
        ITEMS
    );
}

#[test]
#[serial]
fn test_second_daemon_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = start_daemon(dir.path());
    wait_until_started(dir.path());

    let second = Command::new(env!("CARGO_BIN_EXE_hearth-daemon"))
        .arg(dir.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(!second.success());

    terminate(&first);
    assert!(first.wait().unwrap().success());
}

#[test]
#[serial]
fn test_interrupted_commit_refuses_start() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("items.txt"), ITEMS).unwrap();
    fs::write(dir.path().join("items.ndt"), "Item\n{\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_hearth-daemon"))
        .arg(dir.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert!(!status.success());
    // Nothing was touched.
    assert_eq!(
        fs::read_to_string(dir.path().join("items.txt")).unwrap(),
        ITEMS
    );
    assert!(dir.path().join("items.ndt").exists());
}
