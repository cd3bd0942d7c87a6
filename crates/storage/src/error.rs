// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spool storage error taxonomy (spec.md §7 StorageError).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no results directory for transaction {0}")]
    NoResultsDirectory(String),

    #[error("failed to create results directory {path}: {source}")]
    CreateDir { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("metadata file for transaction {0} does not exist")]
    MetadataMissing(String),

    #[error("metadata for transaction {0} is not valid JSON: {1}")]
    MetadataNotJson(String, String),

    #[error("metadata for transaction {0} failed validation: {1}")]
    InvalidMetadata(String, String),

    #[error("invalid integer in file {path}: {value:?}")]
    InvalidInteger { path: PathBuf, value: String },
}
