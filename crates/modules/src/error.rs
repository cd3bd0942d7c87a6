// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module error taxonomy (spec.md §7 ModuleError / §4.6).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("failed to load module {name}: {reason}")]
    LoadingError { name: String, reason: String },

    #[error("unknown module {0}")]
    UnknownModule(String),

    #[error("module {module} does not declare action {action}")]
    UnknownAction { module: String, action: String },

    #[error("module {0} does not support non-blocking dispatch")]
    AsyncUnsupported(String),

    #[error("params for {module}.{action} failed input validation: {reason}")]
    InvalidInput { module: String, action: String, reason: String },

    #[error("processing error for {module}.{action}: {reason}")]
    ProcessingError { module: String, action: String, reason: String },

    #[error("{module}.{action} returned output that failed results validation: {reason}")]
    BadOutput { module: String, action: String, reason: String },

    #[error("no task implementation matches the agent's supported features")]
    NoMatchingImplementation,

    #[error("unsupported task input_method {0}")]
    UnsupportedInputMethod(String),

    #[error("failed to fetch task file {filename} (sha256 {sha256}): {reason}")]
    TaskFetch { filename: String, sha256: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
