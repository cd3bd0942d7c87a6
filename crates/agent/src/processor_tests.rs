// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use async_trait::async_trait;
use pxp_connector::{ConnectorError, MessageHandler};
use pxp_core::{FakeClock, ModuleType};
use pxp_modules::{ActionDescriptor, EchoModule, ModuleDescriptor};
use pxp_wire::{DataChunk, Envelope, BLOCKING_REQUEST_MESSAGE_TYPE, NON_BLOCKING_REQUEST_MESSAGE_TYPE};
use std::time::Duration;

/// A minimal internal module that supports non-blocking dispatch, standing in
/// for an external or task module without the subprocess machinery.
struct AsyncEchoModule<C: Clock> {
    descriptor: ModuleDescriptor,
    clock: C,
}

impl<C: Clock> AsyncEchoModule<C> {
    fn new(clock: C) -> Self {
        let descriptor = ModuleDescriptor {
            name: "async_echo".into(),
            description: "Echo, but non-blocking dispatch is supported".into(),
            supports_async: true,
            actions: vec![ActionDescriptor {
                name: "echo".into(),
                input_schema: serde_json::json!({ "type": "object" }),
                results_schema: serde_json::json!({ "type": "object" }),
            }],
        };
        Self { descriptor, clock }
    }
}

#[async_trait]
impl<C: Clock> Module for AsyncEchoModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, pxp_modules::ModuleError> {
        let mut response = ActionResponse::metadata_from_request(request, ModuleType::Internal, &self.clock);
        response.set_valid_results_and_end(request.params.clone(), &self.clock);
        Ok(response)
    }
}

/// An echo module that advertises a strict results schema its own output
/// never satisfies, to exercise output-schema enforcement in dispatch.
struct StrictEchoModule<C: Clock> {
    descriptor: ModuleDescriptor,
    clock: C,
}

impl<C: Clock> StrictEchoModule<C> {
    fn new(clock: C) -> Self {
        let descriptor = ModuleDescriptor {
            name: "strict_echo".into(),
            description: "Echo, but its results schema rejects the echoed shape".into(),
            supports_async: false,
            actions: vec![ActionDescriptor {
                name: "echo".into(),
                input_schema: serde_json::json!({ "type": "object" }),
                results_schema: serde_json::json!({
                    "type": "object",
                    "required": ["ok"],
                    "properties": { "ok": { "type": "boolean" } },
                }),
            }],
        };
        Self { descriptor, clock }
    }
}

#[async_trait]
impl<C: Clock> Module for StrictEchoModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, pxp_modules::ModuleError> {
        let mut response = ActionResponse::metadata_from_request(request, ModuleType::Internal, &self.clock);
        response.set_valid_results_and_end(request.params.clone(), &self.clock);
        Ok(response)
    }
}

#[derive(Default)]
struct Recorded {
    provisional: Vec<ActionRequest>,
    blocking: Vec<(ActionResponse, ActionRequest)>,
    status: Vec<(ActionResponse, ActionRequest)>,
    non_blocking: Vec<ActionResponse>,
    pxp_errors: Vec<(ActionRequest, String)>,
    pcp_errors: Vec<(RequestId, String, Vec<String>)>,
}

struct FakeConnector {
    recorded: AsyncMutex<Recorded>,
}

impl FakeConnector {
    fn new() -> Self {
        Self { recorded: AsyncMutex::new(Recorded::default()) }
    }
}

#[async_trait]
impl PcpConnector for FakeConnector {
    async fn run(&self, _handler: MessageHandler) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn send_provisional_response(&self, request: &ActionRequest) {
        self.recorded.lock().await.provisional.push(request.clone());
    }

    async fn send_blocking_response(&self, response: &ActionResponse, request: &ActionRequest) {
        self.recorded.lock().await.blocking.push((response.clone(), request.clone()));
    }

    async fn send_status_response(&self, response: &ActionResponse, request: &ActionRequest) {
        self.recorded.lock().await.status.push((response.clone(), request.clone()));
    }

    async fn send_non_blocking_response(&self, response: &ActionResponse) {
        self.recorded.lock().await.non_blocking.push(response.clone());
    }

    async fn send_pxp_error(&self, request: &ActionRequest, description: &str) {
        self.recorded.lock().await.pxp_errors.push((request.clone(), description.to_string()));
    }

    async fn send_pcp_error(&self, request_id: RequestId, description: &str, endpoints: Vec<String>) {
        self.recorded.lock().await.pcp_errors.push((request_id, description.to_string(), endpoints));
    }
}

fn chunks_for(message_type: &str, sender: &str, id: &str, payload: serde_json::Value) -> ParsedChunks {
    ParsedChunks {
        envelope: Envelope {
            sender: sender.into(),
            target: vec!["pcp:///server".into()],
            message_type: message_type.into(),
            id: RequestId::new(id),
            in_reply_to: None,
            expires: None,
        },
        data: DataChunk { content_type: "application/json".into(), payload },
        debug: Vec::new(),
        malformed_debug_count: 0,
    }
}

fn harness(dir: &std::path::Path) -> (Arc<FakeConnector>, RequestProcessor<FakeConnector, FakeClock>, ResultsStorage) {
    let clock = FakeClock::default();
    let storage = ResultsStorage::new(dir.join("spool"), Duration::from_secs(3600));
    let mutex_registry = ResultsMutexRegistry::new();
    let workers = ThreadContainer::new();

    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(EchoModule::new(clock.clone())));
    registry.register(Arc::new(AsyncEchoModule::new(clock.clone())));
    registry.register(Arc::new(StrictEchoModule::new(clock.clone())));
    registry.register(Arc::new(pxp_modules::StatusModule::new(
        storage.clone(),
        mutex_registry.clone(),
        workers.clone(),
        clock.clone(),
    )));

    let connector = Arc::new(FakeConnector::new());
    let processor = RequestProcessor::new(
        Arc::new(registry),
        connector.clone(),
        storage.clone(),
        mutex_registry,
        workers,
        clock,
    );
    (connector, processor, storage)
}

#[tokio::test]
async fn blocking_dispatch_sends_blocking_response() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let chunks = chunks_for(
        BLOCKING_REQUEST_MESSAGE_TYPE,
        "agent-1",
        "req-1",
        serde_json::json!({
            "transaction_id": "tid-1",
            "module": "echo",
            "action": "echo",
            "params": { "hello": "world" },
        }),
    );
    processor.process_request(chunks).await;

    let recorded = connector.recorded.lock().await;
    assert_eq!(recorded.blocking.len(), 1);
    assert!(recorded.pxp_errors.is_empty());
    assert!(recorded.pcp_errors.is_empty());
    let (response, _request) = &recorded.blocking[0];
    assert!(response.action_metadata.results_are_valid);
    assert_eq!(response.action_metadata.results, Some(serde_json::json!({ "hello": "world" })));
}

#[tokio::test]
async fn unknown_module_sends_pxp_error() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let chunks = chunks_for(
        BLOCKING_REQUEST_MESSAGE_TYPE,
        "agent-1",
        "req-2",
        serde_json::json!({
            "transaction_id": "tid-2",
            "module": "no_such_module",
            "action": "whatever",
            "params": {},
        }),
    );
    processor.process_request(chunks).await;

    let recorded = connector.recorded.lock().await;
    assert_eq!(recorded.pxp_errors.len(), 1);
    assert!(recorded.pxp_errors[0].1.contains("no_such_module"));
    assert!(recorded.blocking.is_empty());
}

#[tokio::test]
async fn missing_transaction_id_sends_pcp_error() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let chunks = chunks_for(
        BLOCKING_REQUEST_MESSAGE_TYPE,
        "agent-1",
        "req-3",
        serde_json::json!({
            "module": "echo",
            "action": "echo",
            "params": {},
        }),
    );
    processor.process_request(chunks).await;

    let recorded = connector.recorded.lock().await;
    assert_eq!(recorded.pcp_errors.len(), 1);
    assert!(recorded.pcp_errors[0].1.contains("transaction_id"));
    assert_eq!(recorded.pcp_errors[0].2, vec!["agent-1".to_string()]);
}

#[tokio::test]
async fn non_dispatch_message_type_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let chunks = chunks_for("http://puppetlabs.com/associate_response", "broker", "req-4", serde_json::json!({}));
    processor.process_request(chunks).await;

    let recorded = connector.recorded.lock().await;
    assert!(recorded.blocking.is_empty());
    assert!(recorded.pxp_errors.is_empty());
    assert!(recorded.pcp_errors.is_empty());
}

#[tokio::test]
async fn status_query_for_unknown_transaction_reports_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let chunks = chunks_for(
        BLOCKING_REQUEST_MESSAGE_TYPE,
        "agent-1",
        "req-5",
        serde_json::json!({
            "transaction_id": "tid-status",
            "module": "status",
            "action": "query",
            "params": { "transaction_id": "tid-does-not-exist" },
        }),
    );
    processor.process_request(chunks).await;

    let recorded = connector.recorded.lock().await;
    assert_eq!(recorded.status.len(), 1);
    let (response, _) = &recorded.status[0];
    assert_eq!(response.action_metadata.results.as_ref().unwrap()["status"], "unknown");
}

#[tokio::test]
async fn non_blocking_dispatch_spawns_worker_and_persists_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, storage) = harness(dir.path());

    let chunks = chunks_for(
        NON_BLOCKING_REQUEST_MESSAGE_TYPE,
        "agent-1",
        "req-6",
        serde_json::json!({
            "transaction_id": "tid-nb",
            "module": "async_echo",
            "action": "echo",
            "params": { "k": "v" },
            "notify_outcome": true,
        }),
    );
    processor.process_request(chunks).await;

    {
        let recorded = connector.recorded.lock().await;
        assert_eq!(recorded.provisional.len(), 1);
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    let metadata = storage.get_action_metadata("tid-nb").unwrap();
    assert!(metadata.results_are_valid);
    assert_eq!(metadata.results, Some(serde_json::json!({ "k": "v" })));
    assert_eq!(metadata.request_params, "{}", "params must be scrubbed once finalized");

    let recorded = connector.recorded.lock().await;
    assert_eq!(recorded.non_blocking.len(), 1);
}

#[tokio::test]
async fn blocking_dispatch_downgrades_to_pxp_error_on_output_schema_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let chunks = chunks_for(
        BLOCKING_REQUEST_MESSAGE_TYPE,
        "agent-1",
        "req-9",
        serde_json::json!({
            "transaction_id": "tid-strict",
            "module": "strict_echo",
            "action": "echo",
            "params": { "hello": "world" },
        }),
    );
    processor.process_request(chunks).await;

    let recorded = connector.recorded.lock().await;
    assert!(recorded.blocking.is_empty(), "a result failing its own schema must not be sent as blocking");
    assert_eq!(recorded.pxp_errors.len(), 1);
}

#[tokio::test]
async fn non_blocking_resubmission_of_same_transaction_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, processor, _storage) = harness(dir.path());

    let payload = serde_json::json!({
        "transaction_id": "tid-retry",
        "module": "async_echo",
        "action": "echo",
        "params": {},
    });

    processor.process_request(chunks_for(NON_BLOCKING_REQUEST_MESSAGE_TYPE, "agent-1", "req-7", payload.clone())).await;
    processor.process_request(chunks_for(NON_BLOCKING_REQUEST_MESSAGE_TYPE, "agent-1", "req-8", payload)).await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let recorded = connector.recorded.lock().await;
    assert_eq!(recorded.provisional.len(), 2, "both submissions get a provisional response");
    assert!(recorded.pxp_errors.is_empty());
}
