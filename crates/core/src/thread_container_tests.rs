// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn spawn_noop() -> (JoinHandle<()>, Arc<AtomicBool>) {
    let done = Arc::new(AtomicBool::new(false));
    let handle = tokio::spawn(async {});
    (handle, done)
}

#[tokio::test]
async fn add_rejects_duplicate_names() {
    let container = ThreadContainer::new();
    let (h1, d1) = spawn_noop();
    container.add("T1", h1, d1).unwrap();

    let (h2, d2) = spawn_noop();
    let err = container.add("T1", h2, d2).unwrap_err();
    assert_eq!(err, ThreadContainerError::AlreadyExists("T1".to_string()));
}

#[tokio::test]
async fn find_reflects_registration() {
    let container = ThreadContainer::new();
    assert!(!container.find("T1"));
    let (h, d) = spawn_noop();
    container.add("T1", h, d).unwrap();
    assert!(container.find("T1"));
}

#[tokio::test]
async fn names_snapshots_current_entries() {
    let container = ThreadContainer::new();
    let (h1, d1) = spawn_noop();
    let (h2, d2) = spawn_noop();
    container.add("T1", h1, d1).unwrap();
    container.add("T2", h2, d2).unwrap();

    let mut names = container.names();
    names.sort();
    assert_eq!(names, vec!["T1".to_string(), "T2".to_string()]);
}

#[tokio::test]
async fn reap_once_removes_only_done_entries() {
    let container = ThreadContainer::new();
    let (h1, d1) = spawn_noop();
    let (h2, d2) = spawn_noop();
    d1.store(true, Ordering::Release);
    container.add("done", h1, d1).unwrap();
    container.add("pending", h2, d2).unwrap();

    let removed = container.reap_once();
    assert_eq!(removed, 1);
    assert!(!container.find("done"));
    assert!(container.find("pending"));
}

#[tokio::test]
async fn shutdown_drains_entries_and_does_not_panic_when_pending() {
    let container = ThreadContainer::new();
    let (h, d) = spawn_noop();
    container.add("T1", h, d).unwrap();

    container.shutdown().await;
    assert!(container.is_empty());
}
