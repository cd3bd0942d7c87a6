// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `{name → Module}`, populated at startup and immutable after
//! (spec.md §3 "Module & action registry").

use crate::error::ModuleError;
use crate::module::{validate_against, Module};
use pxp_core::ActionRequest;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self { modules: HashMap::new() }
    }

    /// Register a loaded module. Later registrations under the same name
    /// replace earlier ones; a load failure upstream simply never calls
    /// this for the affected module (spec.md §4.6 "exclude only the
    /// affected module").
    pub fn register(&mut self, module: Arc<dyn Module>) {
        let name = module.describe().name.clone();
        tracing::info!(module = %name, actions = module.describe().actions.len(), "registered module");
        self.modules.insert(name, module);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Validate `req` against its target module/action before dispatch
    /// (spec.md §4.5 point 2).
    pub fn validate_request_content(&self, req: &ActionRequest) -> Result<(), ModuleError> {
        let module = self
            .modules
            .get(&req.module)
            .ok_or_else(|| ModuleError::UnknownModule(req.module.clone()))?;
        let descriptor = module.describe();
        let action = descriptor.action(&req.action).ok_or_else(|| ModuleError::UnknownAction {
            module: req.module.clone(),
            action: req.action.clone(),
        })?;

        if req.request_type == pxp_core::RequestType::NonBlocking && !descriptor.supports_async {
            return Err(ModuleError::AsyncUnsupported(req.module.clone()));
        }

        validate_against(&action.input_schema, &req.params).map_err(|reason| ModuleError::InvalidInput {
            module: req.module.clone(),
            action: req.action.clone(),
            reason,
        })
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
