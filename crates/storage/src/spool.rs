// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-transaction spool layout and atomic metadata writes (spec.md §4.2).

use crate::atomic::atomic_write;
use crate::error::StorageError;
use async_trait::async_trait;
use pxp_core::{ActionMetadata, ActionOutput, Purgeable};
use std::path::{Path, PathBuf};
use std::time::Duration;

const METADATA: &str = "metadata";
const STDOUT: &str = "stdout";
const STDERR: &str = "stderr";
const EXITCODE: &str = "exitcode";
const PID: &str = "pid";

/// The on-disk spool: `<spool_dir>/<transaction_id>/{metadata,stdout,stderr,exitcode,pid}`.
#[derive(Clone)]
pub struct ResultsStorage {
    spool_dir: PathBuf,
    purge_ttl: Duration,
}

impl ResultsStorage {
    pub fn new(spool_dir: impl Into<PathBuf>, purge_ttl: Duration) -> Self {
        Self { spool_dir: spool_dir.into(), purge_ttl }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    fn transaction_dir(&self, transaction_id: &str) -> PathBuf {
        self.spool_dir.join(transaction_id)
    }

    pub fn find(&self, transaction_id: &str) -> bool {
        let dir = self.transaction_dir(transaction_id);
        dir.is_dir()
    }

    /// Create `<spool>/<tid>/` if missing, write `metadata` atomically
    /// (spec.md §4.2).
    pub fn initialize_metadata(
        &self,
        transaction_id: &str,
        metadata: &ActionMetadata,
    ) -> Result<(), StorageError> {
        let dir = self.transaction_dir(transaction_id);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .map_err(|source| StorageError::CreateDir { path: dir.clone(), source })?;
        }
        self.write_metadata_file(&dir, metadata)
    }

    /// Rewrite `metadata` atomically. Fails if the transaction directory is
    /// missing (spec.md §4.2).
    pub fn update_metadata(
        &self,
        transaction_id: &str,
        metadata: &ActionMetadata,
    ) -> Result<(), StorageError> {
        let dir = self.transaction_dir(transaction_id);
        if !dir.is_dir() {
            return Err(StorageError::NoResultsDirectory(transaction_id.to_string()));
        }
        self.write_metadata_file(&dir, metadata)
    }

    fn write_metadata_file(&self, dir: &Path, metadata: &ActionMetadata) -> Result<(), StorageError> {
        let text = serde_json::to_string(metadata)
            .map_err(|e| StorageError::MetadataNotJson("<write>".into(), e.to_string()))?;
        atomic_write(&dir.join(METADATA), &(text + "\n"))
    }

    /// Read, parse, and validate the metadata for `transaction_id`
    /// (spec.md §4.2).
    pub fn get_action_metadata(&self, transaction_id: &str) -> Result<ActionMetadata, StorageError> {
        let path = self.transaction_dir(transaction_id).join(METADATA);
        if !path.exists() {
            return Err(StorageError::MetadataMissing(transaction_id.to_string()));
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|source| StorageError::Read { path: path.clone(), source })?;
        let metadata: ActionMetadata = serde_json::from_str(&text)
            .map_err(|e| StorageError::MetadataNotJson(transaction_id.to_string(), e.to_string()))?;
        metadata
            .validate()
            .map_err(|e| StorageError::InvalidMetadata(transaction_id.to_string(), e))?;
        Ok(metadata)
    }

    pub fn pid_file_exists(&self, transaction_id: &str) -> bool {
        self.transaction_dir(transaction_id).join(PID).exists()
    }

    /// Read the PID file. Fails on a missing file or a non-integer contents
    /// (spec.md §4.2).
    pub fn get_pid(&self, transaction_id: &str) -> Result<i32, StorageError> {
        let path = self.transaction_dir(transaction_id).join(PID);
        read_integer_from_file(&path)
    }

    pub fn output_is_ready(&self, transaction_id: &str) -> bool {
        self.transaction_dir(transaction_id).join(EXITCODE).exists()
    }

    /// Read `{exitcode, stdout, stderr}`, taking the exit code from the
    /// `exitcode` file (spec.md §4.2).
    pub fn get_output(&self, transaction_id: &str) -> Result<ActionOutput, StorageError> {
        let dir = self.transaction_dir(transaction_id);
        let exitcode = read_integer_from_file(&dir.join(EXITCODE))?;
        self.read_output_files(&dir, exitcode)
    }

    /// Same as [`Self::get_output`] but the caller supplies `exitcode`
    /// directly instead of reading the exitcode file (spec.md §4.2).
    pub fn get_output_with_exitcode(
        &self,
        transaction_id: &str,
        exitcode: i32,
    ) -> Result<ActionOutput, StorageError> {
        let dir = self.transaction_dir(transaction_id);
        self.read_output_files(&dir, exitcode)
    }

    fn read_output_files(&self, dir: &Path, exitcode: i32) -> Result<ActionOutput, StorageError> {
        let stderr_path = dir.join(STDERR);
        let std_err = if stderr_path.exists() {
            match std::fs::read_to_string(&stderr_path) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(path = %stderr_path.display(), error = %e, "failed to read stderr file; ignoring");
                    String::new()
                }
            }
        } else {
            String::new()
        };

        let stdout_path = dir.join(STDOUT);
        let std_out = if stdout_path.exists() {
            std::fs::read_to_string(&stdout_path)
                .map_err(|source| StorageError::Read { path: stdout_path, source })?
        } else {
            String::new()
        };

        Ok(ActionOutput { exitcode, std_out, std_err })
    }

    /// Remove spool entries whose metadata `status != running` and whose
    /// `start` predates `now - ttl`, skipping any name present in
    /// `ongoing_transactions` (spec.md §4.2, §4.9).
    pub fn purge_with(
        &self,
        ttl: Duration,
        ongoing_transactions: &[String],
        now_iso: &str,
        mut remove: impl FnMut(&Path),
    ) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.spool_dir) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(tid) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if ongoing_transactions.iter().any(|t| t == tid) {
                continue;
            }
            let metadata = match self.get_action_metadata(tid) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(transaction_id = tid, error = %e, "skipping purge candidate: metadata unreadable");
                    continue;
                }
            };
            if metadata.status == pxp_core::TransactionStatus::Running {
                continue;
            }
            if !is_older_than(&metadata.start, now_iso, ttl) {
                continue;
            }
            remove(&path);
            removed += 1;
        }
        removed
    }
}

fn read_integer_from_file(path: &Path) -> Result<i32, StorageError> {
    if !path.exists() {
        return Err(StorageError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
        });
    }
    let text = std::fs::read_to_string(path)
        .map_err(|source| StorageError::Read { path: path.to_path_buf(), source })?;
    text.trim()
        .parse::<i32>()
        .map_err(|_| StorageError::InvalidInteger { path: path.to_path_buf(), value: text })
}

fn is_older_than(start_iso: &str, now_iso: &str, ttl: Duration) -> bool {
    let (Ok(start), Ok(now)) = (
        chrono::DateTime::parse_from_rfc3339(start_iso),
        chrono::DateTime::parse_from_rfc3339(now_iso),
    ) else {
        return false;
    };
    now.signed_duration_since(start)
        > chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0))
}

#[async_trait]
impl Purgeable for ResultsStorage {
    fn name(&self) -> &str {
        "results_storage"
    }

    fn ttl(&self) -> Duration {
        self.purge_ttl
    }

    async fn purge(&self, ttl: Duration, ongoing_transactions: &[String]) -> usize {
        let this = self.clone();
        let ongoing = ongoing_transactions.to_vec();
        let now_iso = pxp_core::SystemClock.iso8601_utc();
        tokio::task::spawn_blocking(move || {
            this.purge_with(ttl, &ongoing, &now_iso, |path| {
                if let Err(e) = std::fs::remove_dir_all(path) {
                    tracing::error!(path = %path.display(), error = %e, "failed to remove spool entry");
                }
            })
        })
        .await
        .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "spool_tests.rs"]
mod tests;
