// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External module loading and invocation (spec.md §4.6), grounded on
//! `lib/src/external_module.cc`.

use crate::error::ModuleError;
use crate::module::{validate_against, ActionDescriptor, Module, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{ActionRequest, ActionResponse, Clock, ModuleType, RequestType};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Exit code an external module uses to signal "failed to write output
/// files" in non-blocking mode (spec.md §4.6, §6).
const FILE_ERROR_EXITCODE: i32 = 5;
/// Gives the child time to finish flushing output files once it has exited
/// (spec.md §4.6 "output-delay window").
const OUTPUT_DELAY_WINDOW: Duration = Duration::from_millis(100);

pub struct ExternalModule<C: Clock> {
    path: PathBuf,
    config: Value,
    descriptor: ModuleDescriptor,
    clock: C,
}

impl<C: Clock> ExternalModule<C> {
    /// Invoke `path metadata`, parse and validate the module's
    /// self-description, and build the descriptor used for dispatch
    /// (spec.md §4.6 "Loading").
    pub async fn load(path: impl Into<PathBuf>, config: Value, clock: C) -> Result<Self, ModuleError> {
        let path = path.into();
        let name = module_name(&path);

        let output = Command::new(&path)
            .arg("metadata")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ModuleError::LoadingError { name: name.clone(), reason: e.to_string() })?;

        if !output.status.success() {
            return Err(ModuleError::LoadingError {
                name,
                reason: format!("metadata sub-command exited with {:?}", output.status.code()),
            });
        }

        let metadata: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ModuleError::LoadingError { name: name.clone(), reason: format!("metadata is not valid JSON: {e}") })?;

        let description = metadata.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let actions_json = metadata
            .get("actions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ModuleError::LoadingError { name: name.clone(), reason: "missing 'actions' array".into() })?;

        let mut actions = Vec::with_capacity(actions_json.len());
        for action in actions_json {
            let action_name = action
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ModuleError::LoadingError { name: name.clone(), reason: "action missing 'name'".into() })?
                .to_string();
            let input_schema = action
                .get("input")
                .cloned()
                .ok_or_else(|| ModuleError::LoadingError { name: name.clone(), reason: format!("action {action_name} missing 'input' schema") })?;
            let results_schema = action
                .get("results")
                .cloned()
                .ok_or_else(|| ModuleError::LoadingError { name: name.clone(), reason: format!("action {action_name} missing 'results' schema") })?;
            actions.push(ActionDescriptor { name: action_name, input_schema, results_schema });
        }

        let descriptor =
            ModuleDescriptor { name: name.clone(), description, supports_async: true, actions };

        Ok(Self { path, config, descriptor, clock })
    }

    fn action_arguments(&self, request: &ActionRequest) -> Value {
        let mut args = serde_json::json!({ "input": request.params });
        if let Value::Object(map) = &self.config {
            if !map.is_empty() {
                args["configuration"] = self.config.clone();
            }
        }
        if request.request_type == RequestType::NonBlocking {
            if let Some(dir) = &request.results_dir {
                args["output_files"] = serde_json::json!({
                    "stdout": dir.join("stdout").to_string_lossy(),
                    "stderr": dir.join("stderr").to_string_lossy(),
                    "exitcode": dir.join("exitcode").to_string_lossy(),
                });
            }
        }
        args
    }

    fn process_output(
        &self,
        request: &ActionRequest,
        exitcode: i32,
        stdout: String,
        stderr: String,
    ) -> ActionResponse {
        let mut response = ActionResponse::metadata_from_request(request, ModuleType::External, &self.clock);
        response.output = pxp_core::ActionOutput { exitcode, std_out: stdout.clone(), std_err: stderr };

        let parsed: Result<Value, _> = serde_json::from_str(if stdout.is_empty() { "null" } else { &stdout });
        match parsed {
            Ok(results) => response.set_valid_results_and_end(results, &self.clock),
            Err(e) => {
                let error = format!(
                    "the task executed for {}.{} returned invalid JSON on stdout: {e}",
                    request.module, request.action
                );
                response.set_bad_results_and_end(error, &self.clock);
            }
        }
        response
    }

    async fn blocking(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        let args = self.action_arguments(request);
        let input = serde_json::to_vec(&args).unwrap_or_default();

        let mut child = Command::new(&self.path)
            .arg(&request.action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ModuleError::ProcessingError {
                module: self.descriptor.name.clone(),
                action: request.action.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&input).await;
        }

        let output = child.wait_with_output().await.map_err(|e| ModuleError::ProcessingError {
            module: self.descriptor.name.clone(),
            action: request.action.clone(),
            reason: e.to_string(),
        })?;

        Ok(self.process_output(
            request,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    async fn non_blocking(
        &self,
        request: &ActionRequest,
        storage: &pxp_storage::ResultsStorage,
    ) -> Result<ActionResponse, ModuleError> {
        let results_dir = request.results_dir.clone().ok_or_else(|| ModuleError::ProcessingError {
            module: self.descriptor.name.clone(),
            action: request.action.clone(),
            reason: "results_dir not set for non-blocking dispatch".into(),
        })?;

        let args = self.action_arguments(request);
        let input = serde_json::to_vec(&args).unwrap_or_default();

        let mut cmd = Command::new(&self.path);
        cmd.arg(&request.action).stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null());
        detach_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| ModuleError::ProcessingError {
            module: self.descriptor.name.clone(),
            action: request.action.clone(),
            reason: e.to_string(),
        })?;

        if let Some(pid) = child.id() {
            let pid_path = results_dir.join("pid");
            if let Err(e) = pxp_storage::atomic_write(&pid_path, &format!("{pid}\n")) {
                tracing::error!(path = %pid_path.display(), error = %e, "failed to write pid file");
            }
        }

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&input).await;
        }

        let status = child.wait().await.map_err(|e| ModuleError::ProcessingError {
            module: self.descriptor.name.clone(),
            action: request.action.clone(),
            reason: e.to_string(),
        })?;
        let exitcode = status.code().unwrap_or(-1);

        if exitcode == FILE_ERROR_EXITCODE {
            return Err(ModuleError::ProcessingError {
                module: self.descriptor.name.clone(),
                action: request.action.clone(),
                reason: "failed to write output on file".into(),
            });
        }

        tokio::time::sleep(OUTPUT_DELAY_WINDOW).await;

        let output = storage
            .get_output_with_exitcode(&request.transaction_id.to_string(), exitcode)
            .map_err(|e| ModuleError::ProcessingError {
                module: self.descriptor.name.clone(),
                action: request.action.clone(),
                reason: e.to_string(),
            })?;

        Ok(self.process_output(request, output.exitcode, output.std_out, output.std_err))
    }

}

#[cfg(unix)]
fn detach_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach_process_group(_cmd: &mut Command) {}

fn module_name(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

#[async_trait]
impl<C: Clock> Module for ExternalModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::External
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        match request.request_type {
            RequestType::Blocking => self.blocking(request).await,
            RequestType::NonBlocking => Err(ModuleError::ProcessingError {
                module: self.descriptor.name.clone(),
                action: request.action.clone(),
                reason: "non-blocking dispatch requires a storage handle; use `execute_non_blocking`"
                    .into(),
            }),
        }
    }

    async fn execute_non_blocking(
        &self,
        request: &ActionRequest,
        storage: &pxp_storage::ResultsStorage,
    ) -> Result<ActionResponse, ModuleError> {
        match request.request_type {
            RequestType::Blocking => self.blocking(request).await,
            RequestType::NonBlocking => self.non_blocking(request, storage).await,
        }
    }
}

/// Validate a module's declared action output against its results schema
/// (spec.md §4.6 loading; schema is checked once at registration time for
/// well-formedness, and again per invocation by the caller if desired).
pub fn validate_results(descriptor: &ModuleDescriptor, action: &str, results: &Value) -> Result<(), ModuleError> {
    let action_descriptor = descriptor.action(action).ok_or_else(|| ModuleError::UnknownAction {
        module: descriptor.name.clone(),
        action: action.to_string(),
    })?;
    validate_against(&action_descriptor.results_schema, results).map_err(|reason| ModuleError::BadOutput {
        module: descriptor.name.clone(),
        action: action.to_string(),
        reason,
    })
}

#[cfg(test)]
#[path = "external_tests.rs"]
mod tests;
