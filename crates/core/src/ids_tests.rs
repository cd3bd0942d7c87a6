// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn transaction_id_round_trips_through_serde() {
    let id = TransactionId::from("T1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"T1\"");
    let back: TransactionId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn transaction_id_usable_as_hashmap_key_by_str() {
    let mut map = std::collections::HashMap::new();
    map.insert(TransactionId::from("T1"), 42);
    assert_eq!(map.get("T1"), Some(&42));
}

#[test]
fn request_id_display_matches_inner_string() {
    let id = RequestId::from("req-abc");
    assert_eq!(id.to_string(), "req-abc");
    assert_eq!(id.as_str(), "req-abc");
}

#[test]
fn distinct_ids_are_not_equal() {
    assert_ne!(TransactionId::from("T1"), TransactionId::from("T2"));
}
