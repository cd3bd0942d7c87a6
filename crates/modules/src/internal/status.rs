// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in `status` module: transaction status query, the multi-signal
//! derivation in spec.md §4.5 "Status path".

use crate::error::ModuleError;
use crate::module::{ActionDescriptor, Module, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{
    ActionOutput, ActionResponse, Clock, ModuleType, ResultsMutexRegistry, ThreadContainer,
    TransactionId, TransactionStatus,
};
use pxp_storage::{PidStatus, ResultsStorage};
use std::time::Duration;

/// Allows the worker to finish writing metadata before we read it
/// (spec.md §4.5 point 2, "metadata race window").
const METADATA_RACE_WINDOW: Duration = Duration::from_millis(100);
/// Allows the child to finish flushing its output files once we see its
/// exitcode file appear (spec.md §4.5 derivation table, row 5).
const OUTPUT_DELAY_WINDOW: Duration = Duration::from_millis(100);

pub struct StatusModule<C: Clock> {
    descriptor: ModuleDescriptor,
    storage: ResultsStorage,
    mutex_registry: ResultsMutexRegistry,
    workers: ThreadContainer,
    clock: C,
}

impl<C: Clock> StatusModule<C> {
    pub fn new(
        storage: ResultsStorage,
        mutex_registry: ResultsMutexRegistry,
        workers: ThreadContainer,
        clock: C,
    ) -> Self {
        let descriptor = ModuleDescriptor {
            name: "status".into(),
            description: "Query the status of a transaction".into(),
            supports_async: false,
            actions: vec![ActionDescriptor {
                name: "query".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "required": ["transaction_id"],
                    "properties": { "transaction_id": { "type": "string" } },
                }),
                results_schema: serde_json::json!({ "type": "object" }),
            }],
        };
        Self { descriptor, storage, mutex_registry, workers, clock }
    }

    async fn derive(
        &self,
        tid: &str,
    ) -> (TransactionStatus, serde_json::Value, Option<String>, ActionOutput) {
        if !self.storage.find(tid) {
            return (
                TransactionStatus::Unknown,
                serde_json::json!({ "transaction_id": tid, "status": "unknown" }),
                Some("found no results directory".into()),
                ActionOutput::default(),
            );
        }

        let pid_status = pxp_storage::check_pid(self.storage.spool_dir().join(tid).as_path());
        let (running_by_pid, not_running_by_pid) = match pid_status {
            PidStatus::Live(_) => (true, false),
            PidStatus::Stale(_) => (false, true),
            PidStatus::Absent | PidStatus::Unreadable => (false, false),
        };

        if not_running_by_pid && self.mutex_registry.exists(&TransactionId::new(tid.to_string())) {
            tokio::time::sleep(METADATA_RACE_WINDOW).await;
        }

        let metadata = match self.storage.get_action_metadata(tid) {
            Ok(m) => m,
            Err(e) => {
                return (
                    TransactionStatus::Unknown,
                    serde_json::json!({ "transaction_id": tid, "status": "unknown" }),
                    Some(e.to_string()),
                    ActionOutput::default(),
                );
            }
        };

        if metadata.status != TransactionStatus::Running {
            let mut body = serde_json::json!({
                "transaction_id": tid,
                "status": metadata.status.to_string(),
            });
            let output = match self.storage.get_output(tid) {
                Ok(o) => {
                    body["exitcode"] = serde_json::json!(o.exitcode);
                    if !o.std_out.is_empty() {
                        body["stdout"] = serde_json::json!(o.std_out);
                    }
                    if !o.std_err.is_empty() {
                        body["stderr"] = serde_json::json!(o.std_err);
                    }
                    o
                }
                Err(_) => ActionOutput::default(),
            };
            return (metadata.status, body, metadata.execution_error.clone(), output);
        }

        // An exitcode file means the process is done regardless of what the
        // pid signal said; a pid check racing the child's exit can still
        // report "running" for a moment after output lands (spec.md §4.5
        // derivation table, row 5).
        if self.storage.output_is_ready(tid) {
            if running_by_pid {
                tokio::time::sleep(OUTPUT_DELAY_WINDOW).await;
            }
            if let Ok(output) = self.storage.get_output(tid) {
                let status =
                    if output.exitcode == 0 { TransactionStatus::Success } else { TransactionStatus::Failure };
                let mut finalized = metadata.clone();
                finalized.status = status;
                finalized.results_are_valid = true;
                finalized.end = Some(self.clock.iso8601_utc());
                let _ = self.storage.update_metadata(tid, &finalized);
                return (
                    status,
                    serde_json::json!({
                        "transaction_id": tid,
                        "status": status.to_string(),
                        "exitcode": output.exitcode,
                        "stdout": output.std_out,
                        "stderr": output.std_err,
                    }),
                    None,
                    output,
                );
            }
        }

        if running_by_pid {
            return (
                TransactionStatus::Running,
                serde_json::json!({ "transaction_id": tid, "status": "running" }),
                None,
                ActionOutput::default(),
            );
        }

        if not_running_by_pid {
            let mut finalized = metadata.clone();
            finalized.status = TransactionStatus::Undetermined;
            finalized.end = Some(self.clock.iso8601_utc());
            let error = "process is not running but produced no output".to_string();
            finalized.execution_error = Some(error.clone());
            let _ = self.storage.update_metadata(tid, &finalized);
            return (
                TransactionStatus::Undetermined,
                serde_json::json!({ "transaction_id": tid, "status": "undetermined" }),
                Some(error),
                ActionOutput::default(),
            );
        }

        // PID unknown (absent/unreadable), no output yet.
        if self.workers.find(tid) {
            return (
                TransactionStatus::Running,
                serde_json::json!({ "transaction_id": tid, "status": "running" }),
                None,
                ActionOutput::default(),
            );
        }
        (
            TransactionStatus::Unknown,
            serde_json::json!({ "transaction_id": tid, "status": "unknown" }),
            Some("PID and output unavailable".into()),
            ActionOutput::default(),
        )
    }
}

#[async_trait]
impl<C: Clock> Module for StatusModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(
        &self,
        request: &pxp_core::ActionRequest,
    ) -> Result<ActionResponse, ModuleError> {
        let tid = request
            .params
            .get("transaction_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ModuleError::InvalidInput {
                module: "status".into(),
                action: "query".into(),
                reason: "missing transaction_id".into(),
            })?
            .to_string();

        let (status, results, execution_error, output) = self.derive(&tid).await;

        let mut response = ActionResponse::metadata_from_request(request, ModuleType::Internal, &self.clock);
        response.action_metadata.status = status;
        response.action_metadata.results = Some(results);
        response.action_metadata.results_are_valid = execution_error.is_none();
        response.action_metadata.execution_error = execution_error;
        response.status_query_transaction = Some(TransactionId::new(tid));
        response.output = output;
        Ok(response)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
