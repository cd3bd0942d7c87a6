// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response value types (spec.md §3, §4.1).

use crate::clock::Clock;
use crate::error::RequestError;
use crate::ids::{RequestId, TransactionId};
use crate::status::{derive_client_status, TransactionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// The two dispatch shapes a sender can ask for (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Blocking,
    NonBlocking,
}

crate::simple_display! {
    RequestType {
        Blocking => "blocking",
        NonBlocking => "non_blocking",
    }
}

/// A parsed, validated inbound request. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub request_type: RequestType,
    pub sender: String,
    pub id: RequestId,
    pub transaction_id: TransactionId,
    pub module: String,
    pub action: String,
    pub params: Value,
    pub notify_outcome: bool,
    /// Opaque passthrough from the envelope; echoed only in provisional/blocking
    /// responses (spec.md §4.8).
    pub debug: Vec<Value>,
    /// Set by the processor for `NonBlocking` requests before the worker starts
    /// (spec.md §4.5 non-blocking path, step 1).
    pub results_dir: Option<PathBuf>,
}

/// Minimal shape the transport hands to `ActionRequest::parse`: the envelope
/// (routing/identity) and the data chunk (the actual PXP request body).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestEnvelope {
    pub sender: Option<String>,
    pub id: Option<String>,
    #[serde(default)]
    pub debug: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestData {
    pub transaction_id: Option<String>,
    pub module: Option<String>,
    pub action: Option<String>,
    pub params: Option<Value>,
    #[serde(default)]
    pub notify_outcome: bool,
}

impl ActionRequest {
    /// Parse and validate the required fields out of envelope + data chunks.
    ///
    /// Fails with [`RequestError::MissingField`] / [`RequestError::WrongType`]
    /// if `transaction_id`, `module`, `action`, or `params` is absent or the
    /// wrong shape (spec.md §4.1).
    pub fn parse(
        request_type: RequestType,
        envelope: RequestEnvelope,
        data: RequestData,
    ) -> Result<Self, RequestError> {
        let transaction_id =
            data.transaction_id.ok_or(RequestError::MissingField("transaction_id"))?;
        let module = data.module.ok_or(RequestError::MissingField("module"))?;
        let action = data.action.ok_or(RequestError::MissingField("action"))?;
        let params = data.params.ok_or(RequestError::MissingField("params"))?;
        if !params.is_object() {
            return Err(RequestError::WrongType { field: "params", expected: "object" });
        }

        Ok(Self {
            request_type,
            sender: envelope.sender.unwrap_or_default(),
            id: RequestId::new(envelope.id.unwrap_or_default()),
            transaction_id: TransactionId::new(transaction_id),
            module,
            action,
            params,
            notify_outcome: data.notify_outcome,
            debug: envelope.debug,
            results_dir: None,
        })
    }

    /// Set `results_dir` for a non-blocking request, before the worker starts
    /// (spec.md §4.5 non-blocking path, step 1). No-op for blocking requests.
    pub fn set_results_dir(&mut self, dir: PathBuf) {
        self.results_dir = Some(dir);
    }
}

/// `Internal` modules run in-process; `External` modules are invoked as a
/// subprocess (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Internal,
    External,
}

/// Raw output captured from a module invocation (spec.md §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub exitcode: i32,
    pub std_out: String,
    pub std_err: String,
}

/// The canonical, persisted action metadata (spec.md §3 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMetadata {
    pub requester: String,
    pub module: String,
    pub action: String,
    /// Raw params, emptied to `"{}"` before the final persisted write so that
    /// secrets in request params are not retained on disk (spec.md §3).
    pub request_params: String,
    pub transaction_id: TransactionId,
    pub request_id: RequestId,
    pub notify_outcome: bool,
    pub start: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    pub results_are_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

impl ActionMetadata {
    /// Validate the invariants in spec.md §3: a `running` transaction carries
    /// neither `end` nor `results`; `results_are_valid == true` implies both
    /// `results` is present and `status` is terminal.
    pub fn validate(&self) -> Result<(), String> {
        if self.status == TransactionStatus::Running {
            if self.end.is_some() {
                return Err("running metadata must not have `end`".into());
            }
            if self.results.is_some() {
                return Err("running metadata must not have `results`".into());
            }
        }
        if self.results_are_valid && self.results.is_none() {
            return Err("results_are_valid is true but `results` is absent".into());
        }
        if self.results_are_valid
            && !matches!(self.status, TransactionStatus::Success | TransactionStatus::Failure)
        {
            return Err("results_are_valid is true but status is not terminal success/failure".into());
        }
        Ok(())
    }
}

/// Wraps a module invocation's result, pre-wire-serialization (spec.md §3).
#[derive(Debug, Clone)]
pub struct ActionResponse {
    pub module_type: ModuleType,
    pub request_type: RequestType,
    pub output: ActionOutput,
    pub action_metadata: ActionMetadata,
    /// Set only for status-query responses; echoes the queried transaction id.
    pub status_query_transaction: Option<TransactionId>,
}

impl ActionResponse {
    /// Build the initial `running` metadata for a freshly parsed request
    /// (spec.md §4.1).
    pub fn metadata_from_request(
        req: &ActionRequest,
        module_type: ModuleType,
        clock: &impl Clock,
    ) -> Self {
        Self {
            module_type,
            request_type: req.request_type,
            output: ActionOutput::default(),
            action_metadata: ActionMetadata {
                requester: req.sender.clone(),
                module: req.module.clone(),
                action: req.action.clone(),
                request_params: req.params.to_string(),
                transaction_id: req.transaction_id.clone(),
                request_id: req.id.clone(),
                notify_outcome: req.notify_outcome,
                start: clock.iso8601_utc(),
                status: TransactionStatus::Running,
                end: None,
                results: None,
                results_are_valid: false,
                execution_error: None,
            },
            status_query_transaction: None,
        }
    }

    /// Finalize with a valid, schema-checked result (spec.md §4.1).
    pub fn set_valid_results_and_end(&mut self, results: Value, clock: &impl Clock) {
        self.action_metadata.end = Some(clock.iso8601_utc());
        self.action_metadata.results = Some(results);
        self.action_metadata.results_are_valid = true;
        self.action_metadata.status = TransactionStatus::Success;
        self.action_metadata.execution_error = None;
        self.scrub_request_params();
    }

    /// Finalize with a failure (spec.md §4.1).
    pub fn set_bad_results_and_end(&mut self, execution_error: impl Into<String>, clock: &impl Clock) {
        self.action_metadata.end = Some(clock.iso8601_utc());
        self.action_metadata.results = None;
        self.action_metadata.results_are_valid = false;
        self.action_metadata.status = TransactionStatus::Failure;
        self.action_metadata.execution_error = Some(execution_error.into());
        self.scrub_request_params();
    }

    /// Zero out the persisted params once finalized, so raw request content
    /// (potentially containing secrets) doesn't linger in the spool
    /// (spec.md §3 `request_params` note; exercised by scenario 3 in §8).
    fn scrub_request_params(&mut self) {
        self.action_metadata.request_params = "{}".to_string();
    }

    /// Serialize for one of the four wire response shapes (spec.md §4.1).
    pub fn to_wire(&self, kind: ResponseKind) -> Value {
        match kind {
            ResponseKind::Blocking => serde_json::json!({
                "transaction_id": self.action_metadata.transaction_id,
                "results": self.action_metadata.results,
            }),
            ResponseKind::NonBlocking => serde_json::json!({
                "transaction_id": self.action_metadata.transaction_id,
            }),
            ResponseKind::StatusOutput => self.status_output_body(),
            ResponseKind::RpcError => serde_json::json!({
                "id": self.action_metadata.request_id,
                "description": self.action_metadata.execution_error.clone().unwrap_or_default(),
            }),
        }
    }

    fn status_output_body(&self) -> Value {
        let md = &self.action_metadata;
        let client_status =
            derive_client_status(md.status, md.results_are_valid, Some(self.output.exitcode));
        let mut body = serde_json::json!({
            "transaction_id": self.status_query_transaction.clone().unwrap_or_else(|| md.transaction_id.clone()),
            "status": client_status.to_string(),
        });
        if matches!(md.status, TransactionStatus::Success | TransactionStatus::Failure) {
            body["exitcode"] = serde_json::json!(self.output.exitcode);
            if !self.output.std_out.is_empty() {
                body["stdout"] = serde_json::json!(self.output.std_out);
            }
            if !self.output.std_err.is_empty() {
                body["stderr"] = serde_json::json!(self.output.std_err);
            }
        }
        if let Some(err) = &md.execution_error {
            body["execution_error"] = serde_json::json!(err);
        }
        body
    }
}

/// The four wire response shapes (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Blocking,
    NonBlocking,
    StatusOutput,
    RpcError,
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
