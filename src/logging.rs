/*
 * archway - Arch Linux package search and source fetch helper.
 * Copyright (C) 2025  archway contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Logging with tracing support.
//!
//! Diagnostics go to stderr; stdout is reserved for results so `--json`
//! output can be piped.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize logging with a specific level
pub fn init_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();
}

/// Initialize logging with optional file output
pub fn init_with_file(level: &str, log_file: Option<&Path>) {
    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter(level))
                .with(fmt::layer().with_writer(std::io::stderr).compact())
                .with(file_layer)
                .init();

            return;
        }
    }

    // Fallback to console-only
    init_with_level(level);
}

/// Level implied by the command line, falling back to the configured one
pub fn effective_level(verbose: bool, configured: &str) -> &str {
    if verbose {
        "debug"
    } else {
        configured
    }
}
