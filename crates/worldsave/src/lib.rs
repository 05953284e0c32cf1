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

pub use crate::commit::{CommitError, Triad};
pub use crate::config::SaveConfig;
pub use crate::domain::Domain;
pub use crate::loader::{
    LoadError, LoadReport, check_interrupted_commit, load_world, rename_legacy_files,
};
pub use crate::memory_world::MemoryWorld;
pub use crate::orchestrator::{
    CriticalOutcome, SaveError, SaveKind, SaveOrchestrator, SaveReport,
};
pub use crate::record::{Record, RecordError, RecordReader, RecordWriter, SERIAL_KEY, Serial};
pub use crate::world::{Persist, StagingWriter, WorldSink, WorldSource};

pub mod commit;
pub mod config;
pub mod domain;
pub mod incremental;
pub mod loader;
pub mod memory_world;
pub mod orchestrator;
pub mod record;
mod session;
pub mod world;
