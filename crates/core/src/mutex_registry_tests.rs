// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn add_then_get_returns_the_same_lock() {
    let registry = ResultsMutexRegistry::new();
    let id = TransactionId::from("T1");

    let a = registry.add(&id).unwrap();
    let b = registry.get(&id).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn double_add_fails_with_a_typed_error() {
    let registry = ResultsMutexRegistry::new();
    let id = TransactionId::from("T1");

    registry.add(&id).unwrap();
    let err = registry.add(&id).unwrap_err();
    assert_eq!(err, MutexRegistryError::AlreadyExists(id.to_string()));
}

#[test]
fn get_without_prior_add_returns_none() {
    let registry = ResultsMutexRegistry::new();
    assert!(registry.get(&TransactionId::from("T1")).is_none());
}

#[test]
fn distinct_ids_get_distinct_locks() {
    let registry = ResultsMutexRegistry::new();
    let a = registry.add(&TransactionId::from("T1")).unwrap();
    let b = registry.add(&TransactionId::from("T2")).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn exists_reflects_prior_creation_without_creating() {
    let registry = ResultsMutexRegistry::new();
    let id = TransactionId::from("T1");
    assert!(!registry.exists(&id));
    registry.add(&id).unwrap();
    assert!(registry.exists(&id));
}

#[test]
fn remove_drops_entry_but_not_a_held_lock() {
    let registry = ResultsMutexRegistry::new();
    let id = TransactionId::from("T1");
    let lock = registry.add(&id).unwrap();
    let _guard = lock.lock();

    registry.remove(&id);
    assert!(!registry.exists(&id));
    // the guard above is still valid; dropping it here must not panic.
    drop(_guard);
}

#[test]
fn len_and_is_empty_track_registered_transactions() {
    let registry = ResultsMutexRegistry::new();
    assert!(registry.is_empty());
    registry.add(&TransactionId::from("T1")).unwrap();
    registry.add(&TransactionId::from("T2")).unwrap();
    assert_eq!(registry.len(), 2);
}
