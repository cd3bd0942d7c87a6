// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pxp_core::{ActionMetadata, FakeClock, RequestData, RequestEnvelope, RequestId, RequestType, ResponseKind};

fn harness() -> (tempfile::TempDir, StatusModule<FakeClock>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = ResultsStorage::new(dir.path(), Duration::from_secs(86400));
    let module = StatusModule::new(storage, ResultsMutexRegistry::new(), ThreadContainer::new(), FakeClock::default());
    (dir, module)
}

fn query_request(tid: &str) -> pxp_core::ActionRequest {
    pxp_core::ActionRequest::parse(
        RequestType::Blocking,
        RequestEnvelope { sender: Some("pcp://client01/agent".into()), id: Some("r1".into()), debug: vec![] },
        RequestData {
            transaction_id: Some("query-tid".into()),
            module: Some("status".into()),
            action: Some("query".into()),
            params: Some(serde_json::json!({ "transaction_id": tid })),
            notify_outcome: false,
        },
    )
    .unwrap()
}

fn metadata(tid: &str, status: TransactionStatus) -> ActionMetadata {
    ActionMetadata {
        requester: "pcp://client01/agent".into(),
        module: "echo".into(),
        action: "echo".into(),
        request_params: "{}".into(),
        transaction_id: TransactionId::new(tid.to_string()),
        request_id: RequestId::new("r1".to_string()),
        notify_outcome: false,
        start: "2026-01-01T00:00:00.000Z".into(),
        status,
        end: None,
        results: None,
        results_are_valid: false,
        execution_error: None,
    }
}

#[tokio::test]
async fn missing_results_directory_reports_unknown() {
    let (_dir, module) = harness();
    let response = module.execute_action(&query_request("missing")).await.unwrap();
    assert_eq!(response.action_metadata.status, TransactionStatus::Unknown);
    assert!(response.action_metadata.execution_error.is_some());
}

#[tokio::test]
async fn terminal_status_passes_through_with_output() {
    let (dir, module) = harness();
    let mut md = metadata("T1", TransactionStatus::Success);
    md.results_are_valid = true;
    md.end = Some("2026-01-01T00:00:01.000Z".into());
    module.storage.initialize_metadata("T1", &md).unwrap();
    std::fs::write(dir.path().join("T1").join("exitcode"), "0").unwrap();
    std::fs::write(dir.path().join("T1").join("stdout"), "done").unwrap();

    let response = module.execute_action(&query_request("T1")).await.unwrap();
    assert_eq!(response.action_metadata.status, TransactionStatus::Success);
    let results = response.action_metadata.results.unwrap();
    assert_eq!(results["exitcode"], 0);
    assert_eq!(results["stdout"], "done");
}

#[tokio::test]
async fn running_with_live_pid_reports_running() {
    let (dir, module) = harness();
    let md = metadata("T1", TransactionStatus::Running);
    module.storage.initialize_metadata("T1", &md).unwrap();
    std::fs::write(dir.path().join("T1").join("pid"), format!("{}\n", std::process::id())).unwrap();

    let response = module.execute_action(&query_request("T1")).await.unwrap();
    assert_eq!(response.action_metadata.status, TransactionStatus::Running);
}

#[tokio::test]
async fn running_with_dead_pid_and_no_output_becomes_undetermined() {
    let (dir, module) = harness();
    let md = metadata("T1", TransactionStatus::Running);
    module.storage.initialize_metadata("T1", &md).unwrap();
    std::fs::write(dir.path().join("T1").join("pid"), "2147483000\n").unwrap();

    let response = module.execute_action(&query_request("T1")).await.unwrap();
    assert_eq!(response.action_metadata.status, TransactionStatus::Undetermined);

    let persisted = module.storage.get_action_metadata("T1").unwrap();
    assert_eq!(persisted.status, TransactionStatus::Undetermined);
}

#[tokio::test]
async fn running_with_no_pid_file_and_no_worker_is_unknown() {
    let (_dir, module) = harness();
    let md = metadata("T1", TransactionStatus::Running);
    module.storage.initialize_metadata("T1", &md).unwrap();

    let response = module.execute_action(&query_request("T1")).await.unwrap();
    assert_eq!(response.action_metadata.status, TransactionStatus::Unknown);
}

#[tokio::test]
async fn running_with_exitcode_file_finalizes_and_persists() {
    let (dir, module) = harness();
    let md = metadata("T1", TransactionStatus::Running);
    module.storage.initialize_metadata("T1", &md).unwrap();
    std::fs::write(dir.path().join("T1").join("exitcode"), "1").unwrap();
    std::fs::write(dir.path().join("T1").join("stderr"), "boom").unwrap();

    let response = module.execute_action(&query_request("T1")).await.unwrap();
    assert_eq!(response.action_metadata.status, TransactionStatus::Failure);

    let persisted = module.storage.get_action_metadata("T1").unwrap();
    assert_eq!(persisted.status, TransactionStatus::Failure);
    assert!(persisted.results_are_valid);
}

#[tokio::test]
async fn wire_response_carries_exitcode_and_captured_output() {
    let (dir, module) = harness();
    let md = metadata("T1", TransactionStatus::Running);
    module.storage.initialize_metadata("T1", &md).unwrap();
    std::fs::write(dir.path().join("T1").join("exitcode"), "1").unwrap();
    std::fs::write(dir.path().join("T1").join("stdout"), "partial").unwrap();
    std::fs::write(dir.path().join("T1").join("stderr"), "boom").unwrap();

    let response = module.execute_action(&query_request("T1")).await.unwrap();
    let wire = response.to_wire(ResponseKind::StatusOutput);

    assert_eq!(wire["exitcode"], 1);
    assert_eq!(wire["stdout"], "partial");
    assert_eq!(wire["stderr"], "boom");
}
