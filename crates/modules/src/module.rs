// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Module` trait and its self-description (spec.md §3 "Module & action
//! registry", §4.6).

use crate::error::ModuleError;
use async_trait::async_trait;
use pxp_core::{ActionRequest, ActionResponse, ModuleType};
use serde_json::Value;

/// Input/results JSON schemas for one action, as advertised by the module
/// (external modules via their `metadata` sub-command, internal modules via
/// [`Module::describe`]).
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub name: String,
    pub input_schema: Value,
    pub results_schema: Value,
}

/// Self-description a module hands the registry at load time. Internal
/// modules build this directly; external modules build it from their
/// `metadata` sub-command output (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub description: String,
    pub supports_async: bool,
    pub actions: Vec<ActionDescriptor>,
}

impl ModuleDescriptor {
    pub fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// A unit of dispatch: an internal implementation or an external binary
/// (spec.md §3 "Module & action registry").
#[async_trait]
pub trait Module: Send + Sync {
    fn describe(&self) -> &ModuleDescriptor;

    fn module_type(&self) -> ModuleType;

    /// Execute `request.action` against this module. The caller has already
    /// validated `request.params` against the action's input schema.
    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError>;

    /// Non-blocking dispatch variant for modules that need the spool handle
    /// to read back the files a detached child writes (external modules,
    /// spec.md §4.6). Most modules don't need `storage` and just delegate to
    /// [`Module::execute_action`].
    async fn execute_non_blocking(
        &self,
        request: &ActionRequest,
        storage: &pxp_storage::ResultsStorage,
    ) -> Result<ActionResponse, ModuleError> {
        let _ = storage;
        self.execute_action(request).await
    }
}

/// Validate `instance` against `schema`, compiling the schema fresh for each
/// call (modules are loaded once at startup; validation is not a hot path).
pub fn validate_against(schema: &Value, instance: &Value) -> Result<(), String> {
    let compiled = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
    let errors: Vec<String> = compiled.iter_errors(instance).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
