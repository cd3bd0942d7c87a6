// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of in-flight non-blocking workers (spec.md §4.4).
//!
//! Entries are `{name -> (JoinHandle, done_flag)}`. Once the container grows
//! past [`REAP_THRESHOLD`] entries, a single reaper task wakes on a timer and
//! sweeps entries whose `done_flag` is set, self-terminating once the count
//! falls back below the threshold. Workers themselves set `done_flag` as the
//! last action in their scope-exit handler (`pxp-agent`'s `RequestProcessor`).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Entry count above which the background reaper activates.
pub const REAP_THRESHOLD: usize = 32;

/// How often the reaper wakes while active.
pub const REAP_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThreadContainerError {
    #[error("worker {0} is already registered")]
    AlreadyExists(String),
}

struct Entry {
    handle: Option<JoinHandle<()>>,
    done: Arc<AtomicBool>,
}

/// Tracks in-flight non-blocking workers by name (the transaction id, in
/// practice), reaping finished entries in the background.
#[derive(Clone)]
pub struct ThreadContainer {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    reaper_running: Arc<AtomicBool>,
    reaper_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Default for ThreadContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadContainer {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            reaper_running: Arc::new(AtomicBool::new(false)),
            reaper_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a worker. Fails if `name` is already present.
    pub fn add(
        &self,
        name: impl Into<String>,
        handle: JoinHandle<()>,
        done: Arc<AtomicBool>,
    ) -> Result<(), ThreadContainerError> {
        let name = name.into();
        let mut entries = self.entries.lock();
        if entries.contains_key(&name) {
            return Err(ThreadContainerError::AlreadyExists(name));
        }
        entries.insert(name, Entry { handle: Some(handle), done });
        let count = entries.len();
        drop(entries);

        if count > REAP_THRESHOLD && !self.reaper_running.swap(true, Ordering::AcqRel) {
            self.spawn_reaper();
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Snapshot of currently registered names, used by the purge loop to
    /// avoid collecting spool entries with a live worker (spec.md §4.9).
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry whose `done` flag is set. Returns how many were removed.
    fn reap_once(&self) -> usize {
        let mut entries = self.entries.lock();
        let done_names: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.done.load(Ordering::Acquire))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &done_names {
            entries.remove(name);
        }
        done_names.len()
    }

    fn spawn_reaper(&self) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAP_CHECK_INTERVAL).await;
                this.reap_once();
                if this.len() <= REAP_THRESHOLD {
                    break;
                }
            }
            this.reaper_running.store(false, Ordering::Release);
        });
        *self.reaper_handle.lock() = Some(handle);
    }

    /// Process-wide shutdown (spec.md §4.4, §5 cancellation/timeout): wait for
    /// the reaper to finish its current pass, then detach any still-pending
    /// entries — their handles are simply dropped, which leaves the
    /// underlying tokio task running loose; results may or may not be
    /// persisted by the time the process actually exits.
    pub async fn shutdown(&self) {
        let reaper = self.reaper_handle.lock().take();
        if let Some(handle) = reaper {
            let _ = handle.await;
        }

        let pending: Vec<(String, Entry)> = {
            let mut entries = self.entries.lock();
            entries.drain().collect()
        };
        for (name, entry) in pending {
            if !entry.done.load(Ordering::Acquire) {
                tracing::warn!(worker = %name, "thread container shutdown with worker not yet done; detaching");
            }
        }
    }
}

#[cfg(test)]
#[path = "thread_container_tests.rs"]
mod tests;
