// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-transaction mutex registry (spec.md §4.3).
//!
//! A status query and the worker finalizing that same transaction both touch
//! the metadata file; they serialize on a mutex keyed by transaction id
//! rather than one lock for the whole spool. The outer map lock is only ever
//! held long enough to look up or insert an `Arc<Mutex<()>>`; the returned
//! guard is what actually serializes metadata access.

use crate::ids::TransactionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutexRegistryError {
    #[error("transaction {0} already has a registered mutex")]
    AlreadyExists(String),
}

/// Process-wide registry of per-transaction locks.
#[derive(Clone, Default)]
pub struct ResultsMutexRegistry {
    inner: Arc<Mutex<HashMap<TransactionId, Arc<Mutex<()>>>>>,
}

impl ResultsMutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new lock for `id` and return it. Fails if one is already
    /// registered, since two workers racing to add the same transaction
    /// would otherwise silently share the second caller's fresh lock instead
    /// of the first's (spec.md §4.3 "add tid" step).
    pub fn add(&self, id: &TransactionId) -> Result<Arc<Mutex<()>>, MutexRegistryError> {
        let mut map = self.inner.lock();
        if map.contains_key(id) {
            return Err(MutexRegistryError::AlreadyExists(id.to_string()));
        }
        let lock = Arc::new(Mutex::new(()));
        map.insert(id.clone(), lock.clone());
        Ok(lock)
    }

    /// Fetch the lock for `id` without creating one.
    pub fn get(&self, id: &TransactionId) -> Option<Arc<Mutex<()>>> {
        self.inner.lock().get(id).cloned()
    }

    /// Whether a lock has been created for `id` (does not create one).
    pub fn exists(&self, id: &TransactionId) -> bool {
        self.inner.lock().contains_key(id)
    }

    /// Drop the lock for `id`. Safe to call even while another holder still
    /// references the `Arc` (the entry is removed from the map but the lock
    /// itself lives until the last clone is dropped), so this never blocks on
    /// or corrupts an in-flight critical section.
    pub fn remove(&self, id: &TransactionId) {
        self.inner.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "mutex_registry_tests.rs"]
mod tests;
