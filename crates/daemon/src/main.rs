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

use crate::args::Args;
use crate::server::Server;
use ::tracing::{error, info};
use clap::Parser;
use eyre::{Report, bail, eyre};
use fs2::FileExt;
use hearth_common::util::{spawn_named, thread_registry};
use hearth_common::{build, tracing};
use hearth_kernel::pulse::{send_pulse, wake_tasks_thread};
use hearth_worldsave::{MemoryWorld, SaveOrchestrator, load_world};
use mimalloc::MiMalloc;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod args;
mod config;
mod server;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Acquire an exclusive lock on the data directory, so two daemons never save over each other.
fn acquire_data_directory_lock(data_dir: &Path) -> Result<File, Report> {
    std::fs::create_dir_all(data_dir)?;

    let lock_file_path = data_dir.join(".hearth-daemon.lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_file_path)?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {
            info!("Acquired exclusive lock on data directory: {:?}", data_dir);
            Ok(lock_file)
        }
        Err(e) => {
            error!(
                "Failed to acquire lock on data directory {:?}. Another hearth-daemon instance may already be running in this directory.",
                data_dir
            );
            bail!("Directory lock acquisition failed: {}", e);
        }
    }
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::parse();

    let version = semver::Version::parse(build::PKG_VERSION)
        .map_err(|e| eyre!("Invalid hearth version '{}': {}", build::PKG_VERSION, e))?;

    tracing::init_tracing(args.debug).map_err(|e| eyre!("Unable to configure logging: {}", e))?;

    let config = args.load_config()?;
    let _data_dir_lock = acquire_data_directory_lock(&args.data_dir)?;

    info!(%version, data_dir = ?args.data_dir, "Loading world");
    let mut world = MemoryWorld::new();
    load_world(&args.data_dir, &mut world, config.save.ignore_load_errors)
        .map_err(|e| eyre!("Unable to load world from {:?}: {}", args.data_dir, e))?;
    let world = Arc::new(world);

    let orchestrator = SaveOrchestrator::new(&args.data_dir, config.save.clone(), world.clone());
    let kill_switch = Arc::new(AtomicBool::new(false));
    let server = Arc::new(Server::new(config, orchestrator, kill_switch.clone()));

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let signals_handle = signals.handle();
    let signals_thread = spawn_named("signals", move || {
        for signal in signals.forever() {
            info!(signal, "Received signal, shutting down");
            kill_switch.store(true, Ordering::SeqCst);
            send_pulse();
            wake_tasks_thread();
        }
    })?;

    let tasks_thread = server.spawn_tasks_thread()?;
    info!(
        version = build::PKG_VERSION,
        entities = world.len(),
        "Daemon started"
    );

    server.run_main_loop();
    if let Err(e) = tasks_thread.join() {
        error!("Tasks thread panicked: {:?}", e);
    }
    signals_handle.close();
    if let Err(e) = signals_thread.join() {
        error!("Signals thread panicked: {:?}", e);
    }

    server
        .final_save()
        .map_err(|e| eyre!("Final save failed: {}", e))?;

    let remaining = thread_registry().names();
    if !remaining.is_empty() {
        info!(threads = ?remaining, "Threads still registered at exit");
    }

    info!("Done.");
    Ok(())
}
