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

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Seconds between full saves.
    pub interval_seconds: u64,
    /// Seconds between incremental saves. None disables them.
    pub incremental_interval_seconds: Option<u64>,
    /// Refuse every save request. For test shards that must never touch their data files.
    pub inhibit_saves: bool,
    /// Skip records which fail to load instead of refusing to start.
    pub ignore_load_errors: bool,
    /// Domain writer threads. If None, half the logical cores, but at least two.
    pub writer_threads: Option<usize>,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 1800,
            incremental_interval_seconds: None,
            inhibit_saves: false,
            ignore_load_errors: false,
            writer_threads: None,
        }
    }
}

impl SaveConfig {
    pub fn writer_thread_count(&self) -> usize {
        match self.writer_threads {
            Some(n) => n.max(1),
            None => (hearth_kernel::default_worker_count() / 2).max(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_threads() {
        assert!(SaveConfig::default().writer_thread_count() >= 2);
        let config = SaveConfig {
            writer_threads: Some(0),
            ..Default::default()
        };
        assert_eq!(config.writer_thread_count(), 1);
    }
}
