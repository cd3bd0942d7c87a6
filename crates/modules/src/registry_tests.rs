// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::module::{ActionDescriptor, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{ActionResponse, FakeClock, ModuleType, RequestData, RequestEnvelope, RequestType};

struct TestModule {
    descriptor: ModuleDescriptor,
}

impl TestModule {
    fn new(name: &str, supports_async: bool) -> Self {
        Self {
            descriptor: ModuleDescriptor {
                name: name.to_string(),
                description: "test module".into(),
                supports_async,
                actions: vec![ActionDescriptor {
                    name: "run".into(),
                    input_schema: serde_json::json!({
                        "type": "object",
                        "required": ["x"],
                        "properties": { "x": { "type": "integer" } },
                    }),
                    results_schema: serde_json::json!({ "type": "object" }),
                }],
            },
        }
    }
}

#[async_trait]
impl Module for TestModule {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(&self, request: &pxp_core::ActionRequest) -> Result<ActionResponse, ModuleError> {
        Ok(ActionResponse::metadata_from_request(request, ModuleType::Internal, &FakeClock::default()))
    }
}

fn request(module: &str, action: &str, request_type: RequestType, params: serde_json::Value) -> pxp_core::ActionRequest {
    pxp_core::ActionRequest::parse(
        request_type,
        RequestEnvelope { sender: Some("pcp://client01/agent".into()), id: Some("r1".into()), debug: vec![] },
        RequestData {
            transaction_id: Some("T1".into()),
            module: Some(module.into()),
            action: Some(action.into()),
            params: Some(params),
            notify_outcome: false,
        },
    )
    .unwrap()
}

#[test]
fn register_and_get_round_trips() {
    let mut registry = ModuleRegistry::new();
    assert!(registry.is_empty());
    registry.register(Arc::new(TestModule::new("alpha", true)));
    assert_eq!(registry.len(), 1);
    assert!(registry.get("alpha").is_some());
    assert!(registry.get("missing").is_none());
    assert_eq!(registry.names(), vec!["alpha".to_string()]);
}

#[test]
fn re_registering_the_same_name_replaces_the_entry() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(TestModule::new("alpha", true)));
    registry.register(Arc::new(TestModule::new("alpha", false)));
    assert_eq!(registry.len(), 1);
    assert!(!registry.get("alpha").unwrap().describe().supports_async);
}

#[test]
fn validate_request_content_rejects_unknown_module() {
    let registry = ModuleRegistry::new();
    let req = request("missing", "run", RequestType::Blocking, serde_json::json!({ "x": 1 }));
    let result = registry.validate_request_content(&req);
    assert!(matches!(result, Err(ModuleError::UnknownModule(m)) if m == "missing"));
}

#[test]
fn validate_request_content_rejects_unknown_action() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(TestModule::new("alpha", true)));
    let req = request("alpha", "nope", RequestType::Blocking, serde_json::json!({ "x": 1 }));
    let result = registry.validate_request_content(&req);
    assert!(matches!(result, Err(ModuleError::UnknownAction { .. })));
}

#[test]
fn validate_request_content_rejects_non_blocking_when_unsupported() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(TestModule::new("alpha", false)));
    let req = request("alpha", "run", RequestType::NonBlocking, serde_json::json!({ "x": 1 }));
    let result = registry.validate_request_content(&req);
    assert!(matches!(result, Err(ModuleError::AsyncUnsupported(m)) if m == "alpha"));
}

#[test]
fn validate_request_content_rejects_params_failing_input_schema() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(TestModule::new("alpha", true)));
    let req = request("alpha", "run", RequestType::Blocking, serde_json::json!({}));
    let result = registry.validate_request_content(&req);
    assert!(matches!(result, Err(ModuleError::InvalidInput { .. })));
}

#[test]
fn validate_request_content_accepts_valid_params() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(TestModule::new("alpha", true)));
    let req = request("alpha", "run", RequestType::Blocking, serde_json::json!({ "x": 1 }));
    assert!(registry.validate_request_content(&req).is_ok());
}
