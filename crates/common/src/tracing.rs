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

//! Shared tracing initialization for hearth binaries

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Build the level filter: `RUST_LOG` when set, otherwise `debug` or `info` depending on the
/// fallback flag. `gdt_cpus` is always silenced; it is chatty at startup.
fn level_filter(debug_fallback: bool) -> Result<EnvFilter, eyre::Report> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter.add_directive("gdt_cpus=off".parse()?),
        Err(_) => {
            let level = if debug_fallback { "debug" } else { "info" };
            EnvFilter::new(format!("{level},gdt_cpus=off"))
        }
    };
    Ok(filter)
}

/// Initialize tracing with environment-based configuration and fallback support.
///
/// Thread names are included in every line, since most of what the server does interesting
/// happens on pool workers and save threads whose names identify the pool or domain.
///
/// # Arguments
/// * `debug_fallback` - If true and `RUST_LOG` is not set, uses DEBUG level; otherwise INFO
pub fn init_tracing(debug_fallback: bool) -> Result<(), eyre::Report> {
    let filter = level_filter(debug_fallback)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_ansi(true)
                .with_file(true)
                .with_target(false)
                .with_line_number(true)
                .with_thread_names(true)
                .with_span_events(fmt::format::FmtSpan::NONE),
        )
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("Unable to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Initialize tracing for tests. Output goes through the test writer so it is captured per-test,
/// and repeated initialization is ignored.
pub fn init_test_tracing() {
    let Ok(filter) = level_filter(true) else {
        return;
    };
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_test_writer()
                .with_thread_names(true),
        )
        .with(filter)
        .try_init();
}
