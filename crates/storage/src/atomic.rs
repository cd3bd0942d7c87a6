// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-temp-then-rename helper shared by every spool writer (spec.md §3,
//! §4.2: "All writes use write-temp + rename on the same filesystem").

use std::path::Path;

use crate::error::StorageError;

/// Write `contents` to `path` atomically: a sibling temp file is written and
/// fsync'd, then renamed over `path`. The temp file lives in the same
/// directory so the rename is guaranteed to be on one filesystem.
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .map_err(|source| StorageError::Write { path: path.to_path_buf(), source })?;

    use std::io::Write;
    temp.write_all(contents.as_bytes())
        .and_then(|_| temp.flush())
        .map_err(|source| StorageError::Write { path: path.to_path_buf(), source })?;

    temp.persist(path)
        .map_err(|e| StorageError::Write { path: path.to_path_buf(), source: e.error })?;
    Ok(())
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
