// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide `tracing` subscriber setup (SPEC_FULL.md §1.1): env-filter
//! driven level, file-or-stderr sink chosen by `Configuration::logfile`.

use pxp_core::Configuration;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const ENV_FILTER_VAR: &str = "PXP_AGENT_LOG";
const DEFAULT_FILTER: &str = "info";
const DEFAULT_FILE_NAME: &str = "pxp-agent.log";

/// Split a configured logfile path into the directory/basename pair
/// `tracing_appender::rolling` wants, falling back to `.`/a default name for
/// a bare filename with no parent component.
fn resolve_file_sink(path: &Path) -> (PathBuf, String) {
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| DEFAULT_FILE_NAME.into());
    (directory.to_path_buf(), file_name)
}

/// Install the process-wide default subscriber. The returned [`WorkerGuard`]
/// must be kept alive for the life of the process when logging to a file —
/// dropping it flushes and stops the background writer thread.
pub fn init(config: &Configuration) -> WorkerGuard {
    let filter = EnvFilter::try_from_env(ENV_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match &config.logfile {
        Some(path) => {
            let (directory, file_name) = resolve_file_sink(path);
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            guard
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            guard
        }
    }
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
