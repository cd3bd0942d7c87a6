// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pxp_core::{FakeClock, RequestData, RequestEnvelope, RequestType};

fn request(params: serde_json::Value) -> ActionRequest {
    ActionRequest::parse(
        RequestType::Blocking,
        RequestEnvelope { sender: Some("pcp://client01/agent".into()), id: Some("r1".into()), debug: vec![] },
        RequestData {
            transaction_id: Some("T1".into()),
            module: Some("echo".into()),
            action: Some("echo".into()),
            params: Some(params),
            notify_outcome: false,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn echo_returns_input_params_as_results() {
    let module = EchoModule::new(FakeClock::default());
    let req = request(serde_json::json!({ "greeting": "hi" }));
    let response = module.execute_action(&req).await.unwrap();
    assert_eq!(response.action_metadata.results, Some(serde_json::json!({ "greeting": "hi" })));
    assert!(response.action_metadata.results_are_valid);
}
