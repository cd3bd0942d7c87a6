// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pxp_core::{FakeClock, RequestData, RequestEnvelope, RequestType};

#[tokio::test]
async fn inventory_reports_agent_version_and_supported_pcp_versions() {
    let module = InventoryModule::new(FakeClock::default());
    let req = ActionRequest::parse(
        RequestType::Blocking,
        RequestEnvelope { sender: Some("pcp://client01/agent".into()), id: Some("r1".into()), debug: vec![] },
        RequestData {
            transaction_id: Some("T1".into()),
            module: Some("inventory".into()),
            action: Some("inventory".into()),
            params: Some(serde_json::json!({})),
            notify_outcome: false,
        },
    )
    .unwrap();
    let response = module.execute_action(&req).await.unwrap();
    let facts = response.action_metadata.results.unwrap();
    assert!(facts["facts"]["agent_version"].is_string());
    assert_eq!(facts["facts"]["supported_pcp_versions"], serde_json::json!(["1", "2"]));
}
