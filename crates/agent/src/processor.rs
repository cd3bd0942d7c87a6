// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request ingestion, validation, and dispatch (spec.md §4.5), grounded on
//! the teacher's `ConnectionError`-funnel pattern in
//! `crates/daemon/src/listener/mod.rs`: every handler error is coerced to
//! the right response shape in one place rather than propagated raw.

use pxp_connector::PcpConnector;
use pxp_core::{
    ActionRequest, ActionResponse, Clock, RequestData, RequestEnvelope, RequestType,
    ResultsMutexRegistry, ThreadContainer, TransactionId, TransactionStatus,
};
use pxp_modules::{validate_results, Module, ModuleRegistry};
use pxp_storage::ResultsStorage;
use pxp_wire::{request_type_for, ParsedChunks};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

const STATUS_MODULE: &str = "status";

/// Ties the module registry, spool, and connector together: one instance per
/// agent process (spec.md §4.5).
pub struct RequestProcessor<Conn: PcpConnector + 'static, C: Clock + 'static> {
    registry: Arc<ModuleRegistry>,
    connector: Arc<Conn>,
    storage: ResultsStorage,
    mutex_registry: ResultsMutexRegistry,
    workers: ThreadContainer,
    /// Serializes the non-blocking path's check-then-act: "is a worker
    /// already registered for this tid" must be answered and acted on
    /// atomically, or two near-simultaneous submissions for the same
    /// transaction could both pass the check and both spawn a worker.
    worker_registration_lock: AsyncMutex<()>,
    clock: C,
}

impl<Conn, C> RequestProcessor<Conn, C>
where
    Conn: PcpConnector + 'static,
    C: Clock + 'static,
{
    pub fn new(
        registry: Arc<ModuleRegistry>,
        connector: Arc<Conn>,
        storage: ResultsStorage,
        mutex_registry: ResultsMutexRegistry,
        workers: ThreadContainer,
        clock: C,
    ) -> Self {
        Self { registry, connector, storage, mutex_registry, workers, worker_registration_lock: AsyncMutex::new(()), clock }
    }

    /// Entry point invoked by the connector for every validated inbound
    /// message (spec.md §4.5 "Ingestion").
    #[tracing::instrument(skip(self, chunks), fields(message_type = %chunks.envelope.message_type))]
    pub async fn process_request(&self, chunks: ParsedChunks) {
        let Some(request_type) = request_type_for(&chunks.envelope.message_type) else {
            tracing::debug!("ignoring inbound message that isn't a dispatch request");
            return;
        };

        let request_id = chunks.envelope.id.clone();
        let sender = chunks.envelope.sender.clone();

        let data: RequestData = match serde_json::from_value(chunks.data.payload.clone()) {
            Ok(d) => d,
            Err(e) => {
                self.connector
                    .send_pcp_error(request_id, &format!("malformed request body: {e}"), vec![sender])
                    .await;
                return;
            }
        };
        let envelope =
            RequestEnvelope { sender: Some(sender.clone()), id: Some(request_id.as_str().to_string()), debug: chunks.debug };

        let request = match ActionRequest::parse(request_type, envelope, data) {
            Ok(r) => r,
            Err(e) => {
                self.connector.send_pcp_error(request_id, &e.description(), vec![sender]).await;
                return;
            }
        };

        if let Err(e) = self.registry.validate_request_content(&request) {
            self.connector.send_pxp_error(&request, &e.to_string()).await;
            return;
        }

        if request.module == STATUS_MODULE {
            self.dispatch_status(request).await;
        } else if request.request_type == RequestType::Blocking {
            self.dispatch_blocking(request).await;
        } else {
            self.dispatch_non_blocking(request).await;
        }
    }

    async fn dispatch_status(&self, request: ActionRequest) {
        let Some(module) = self.registry.get(&request.module).cloned() else {
            tracing::error!(module = %request.module, "status module vanished after validation");
            return;
        };
        match module.execute_action(&request).await {
            Ok(response) => self.connector.send_status_response(&response, &request).await,
            Err(e) => self.connector.send_pxp_error(&request, &e.to_string()).await,
        }
    }

    async fn dispatch_blocking(&self, request: ActionRequest) {
        let Some(module) = self.registry.get(&request.module).cloned() else {
            tracing::error!(module = %request.module, "module vanished after validation");
            return;
        };
        let mut response = match module.execute_action(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.connector.send_pxp_error(&request, &e.to_string()).await;
                return;
            }
        };
        enforce_output_schema(&module, &request, &mut response);

        if response.action_metadata.results_are_valid {
            self.connector.send_blocking_response(&response, &request).await;
        } else {
            let description = response.action_metadata.execution_error.clone().unwrap_or_default();
            self.connector.send_pxp_error(&request, &description).await;
        }
    }

    /// Non-blocking path (spec.md §4.5): set `results_dir`, atomically check
    /// for an already-running worker (idempotent retry), otherwise persist
    /// initial metadata and spawn a worker; always end with a provisional
    /// response unless metadata initialization itself failed.
    async fn dispatch_non_blocking(&self, mut request: ActionRequest) {
        let tid = request.transaction_id.to_string();
        request.set_results_dir(self.storage.spool_dir().join(&tid));

        let init_failure = {
            let guard = self.worker_registration_lock.lock().await;
            let failure = if self.workers.find(&tid) || self.storage.find(&tid) {
                None
            } else {
                match self.registry.get(&request.module).cloned() {
                    Some(module) => {
                        let initial =
                            ActionResponse::metadata_from_request(&request, module.module_type(), &self.clock);
                        match self.storage.initialize_metadata(&tid, &initial.action_metadata) {
                            Ok(()) => {
                                self.spawn_worker(module, request.clone(), tid.clone());
                                None
                            }
                            Err(e) => Some(format!("failed to initialize transaction {tid}: {e}")),
                        }
                    }
                    None => Some(format!("module {} vanished after validation", request.module)),
                }
            };
            drop(guard);
            failure
        };

        match init_failure {
            Some(description) => self.connector.send_pxp_error(&request, &description).await,
            None => self.connector.send_provisional_response(&request).await,
        }
    }

    fn spawn_worker(&self, module: Arc<dyn Module>, request: ActionRequest, tid: String) {
        let connector = self.connector.clone();
        let storage = self.storage.clone();
        let mutex_registry = self.mutex_registry.clone();
        let clock = self.clock.clone();
        let done = Arc::new(AtomicBool::new(false));
        let done_for_task = done.clone();

        let handle = tokio::spawn(async move {
            run_worker(module, request, connector, storage, mutex_registry, clock, done_for_task).await;
        });

        if let Err(e) = self.workers.add(tid, handle, done) {
            tracing::error!(error = %e, "failed to register non-blocking worker");
        }
    }
}

/// A worker's lifetime, detached from `RequestProcessor` (spec.md §4.5
/// "non-blocking path" worker steps): run the module, persist the finalized
/// metadata under the per-transaction mutex, notify if asked, and release
/// the mutex-registry entry and `done` flag on every exit path via
/// [`WorkerScopeGuard`].
async fn run_worker<Conn, C>(
    module: Arc<dyn Module>,
    request: ActionRequest,
    connector: Arc<Conn>,
    storage: ResultsStorage,
    mutex_registry: ResultsMutexRegistry,
    clock: C,
    done: Arc<AtomicBool>,
) where
    Conn: PcpConnector + 'static,
    C: Clock + 'static,
{
    let tid = request.transaction_id.clone();
    let mutex = match mutex_registry.add(&tid) {
        Ok(mutex) => mutex,
        Err(e) => {
            tracing::error!(transaction_id = %tid, error = %e, "worker could not register its own mutex; exiting without running");
            done.store(true, Ordering::Release);
            return;
        }
    };
    let _scope_guard = WorkerScopeGuard { tid: tid.clone(), mutex_registry, done };

    let mut response = match module.execute_non_blocking(&request, &storage).await {
        Ok(response) => response,
        Err(e) => {
            let mut failure = ActionResponse::metadata_from_request(&request, module.module_type(), &clock);
            failure.set_bad_results_and_end(e.to_string(), &clock);
            failure
        }
    };
    enforce_output_schema(&module, &request, &mut response);

    {
        let _lock = mutex.lock();
        if let Err(e) = storage.update_metadata(tid.as_str(), &response.action_metadata) {
            tracing::error!(transaction_id = %tid, error = %e, "failed to persist finalized metadata");
        }
    }

    if request.notify_outcome {
        if response.action_metadata.results_are_valid {
            connector.send_non_blocking_response(&response).await;
        } else {
            let description = response.action_metadata.execution_error.clone().unwrap_or_default();
            connector.send_pxp_error(&request, &description).await;
        }
    }
}

/// Run the module's declared output-schema validator over a valid result
/// before it is considered final (spec.md §4.5 point 5 / §4.6): a module that
/// claims success but returns a result shape it didn't declare is downgraded
/// to a failure rather than handed to the caller or persisted as-is.
fn enforce_output_schema(module: &Arc<dyn Module>, request: &ActionRequest, response: &mut ActionResponse) {
    if !response.action_metadata.results_are_valid {
        return;
    }
    let results = response.action_metadata.results.clone().unwrap_or(serde_json::Value::Null);
    if let Err(e) = validate_results(module.describe(), &request.action, &results) {
        response.action_metadata.results_are_valid = false;
        response.action_metadata.status = TransactionStatus::Failure;
        response.action_metadata.execution_error = Some(e.to_string());
    }
}

struct WorkerScopeGuard {
    tid: TransactionId,
    mutex_registry: ResultsMutexRegistry,
    done: Arc<AtomicBool>,
}

impl Drop for WorkerScopeGuard {
    fn drop(&mut self) {
        self.mutex_registry.remove(&self.tid);
        self.done.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
