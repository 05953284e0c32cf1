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

use crate::config::{Config, RuntimeConfig};
use clap::builder::ValueHint;
use clap_derive::Parser;
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format as ProviderFormat, Serialized, Yaml};
use hearth_kernel::config::PoolConfig;
use hearth_worldsave::SaveConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct Args {
    #[arg(
        value_name = "data-dir",
        help = "Directory holding the world data files",
        value_hint = ValueHint::DirPath,
        default_value = "./hearth-data"
    )]
    pub data_dir: PathBuf,

    #[command(flatten)]
    save_args: Option<SaveArgs>,

    #[command(flatten)]
    pool_args: Option<PoolArgs>,

    #[command(flatten)]
    runtime_args: Option<RuntimeArgs>,

    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. If not specified, defaults are used.\
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct SaveArgs {
    #[arg(
        long,
        value_name = "save-interval-seconds",
        help = "Interval in seconds between full world saves"
    )]
    pub save_interval_seconds: Option<u64>,

    #[arg(
        long,
        value_name = "incremental-interval-seconds",
        help = "Interval in seconds between incremental saves. Incremental saves are off unless set."
    )]
    pub incremental_interval_seconds: Option<u64>,

    #[arg(
        long,
        help = "Never write the world. For throwaway shards and tests.",
        default_value = "false"
    )]
    pub inhibit_saves: bool,

    #[arg(
        long,
        help = "Skip records which fail to load instead of refusing to start",
        default_value = "false"
    )]
    pub ignore_load_errors: bool,

    #[arg(
        long,
        value_name = "writer-threads",
        help = "Number of domain writer threads used while saving (default: half the cores, at least 2)"
    )]
    pub writer_threads: Option<usize>,
}

impl SaveArgs {
    pub fn merge_config(&self, config: &mut SaveConfig) -> Result<(), eyre::Report> {
        if let Some(seconds) = self.save_interval_seconds {
            if seconds == 0 {
                return Err(eyre!("--save-interval-seconds must be positive"));
            }
            config.interval_seconds = seconds;
        }
        if let Some(seconds) = self.incremental_interval_seconds {
            config.incremental_interval_seconds = Some(seconds);
        }
        if self.inhibit_saves {
            config.inhibit_saves = true;
        }
        if self.ignore_load_errors {
            config.ignore_load_errors = true;
        }
        if let Some(threads) = self.writer_threads {
            config.writer_threads = Some(threads);
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct PoolArgs {
    #[arg(
        long,
        value_name = "max-background-workers",
        help = "Upper bound on background worker threads (default: unbounded)"
    )]
    pub max_background_workers: Option<usize>,
}

impl PoolArgs {
    pub fn merge_config(&self, config: &mut PoolConfig) -> Result<(), eyre::Report> {
        if let Some(max) = self.max_background_workers {
            config.max_elastic_workers = Some(max);
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct RuntimeArgs {
    #[arg(
        long,
        value_name = "tick-millis",
        help = "Longest the main and tasks threads sleep between checks (default: 100)"
    )]
    pub tick_millis: Option<u64>,
}

impl RuntimeArgs {
    pub fn merge_config(&self, config: &mut RuntimeConfig) -> Result<(), eyre::Report> {
        if let Some(millis) = self.tick_millis {
            config.tick_millis = millis;
        }
        Ok(())
    }
}

impl Args {
    fn merge_config(&self, mut config: Config) -> Result<Config, eyre::Report> {
        if let Some(args) = self.save_args.as_ref() {
            args.merge_config(&mut config.save)?;
        }
        if let Some(args) = self.pool_args.as_ref() {
            args.merge_config(&mut config.pools)?;
        }
        if let Some(args) = self.runtime_args.as_ref() {
            args.merge_config(&mut config.runtime)?;
        }
        Ok(config)
    }

    /// Load the configuration file if we have it, and then we'll merge the arguments into it.
    pub fn load_config(&self) -> Result<Config, eyre::Report> {
        // Figment's own merging can't see through clap's flattened optional groups, so the
        // arguments are merged by hand afterwards.
        let config = match &self.config_file {
            Some(config_path) => Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Yaml::file(config_path))
                .extract::<Config>()
                .map_err(|e| {
                    eyre!(
                        "Failed to parse configuration from {:?}: {}",
                        config_path,
                        e
                    )
                })?,
            None => Config::default(),
        };
        self.merge_config(config)
    }
}
