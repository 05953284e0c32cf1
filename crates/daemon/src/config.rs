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

use std::time::Duration;

use hearth_kernel::config::PoolConfig;
use hearth_worldsave::SaveConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub save: SaveConfig,
    pub pools: PoolConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Longest the main and tasks threads sleep without being pulsed.
    pub tick_millis: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_millis: 100 }
    }
}

impl RuntimeConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}
