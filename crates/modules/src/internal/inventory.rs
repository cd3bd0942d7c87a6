// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in `inventory` module: static facts about the agent itself
//! (`src/agent/modules/inventory.cpp`; §2 of SPEC_FULL.md — the original
//! shells out to facter, which this agent does not depend on, so the
//! result is limited to the agent's own identity facts).

use crate::error::ModuleError;
use crate::module::{ActionDescriptor, Module, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{ActionRequest, ActionResponse, Clock, ModuleType};

pub struct InventoryModule<C: Clock> {
    descriptor: ModuleDescriptor,
    clock: C,
}

impl<C: Clock> InventoryModule<C> {
    pub fn new(clock: C) -> Self {
        let descriptor = ModuleDescriptor {
            name: "inventory".into(),
            description: "Static facts about this agent".into(),
            supports_async: false,
            actions: vec![ActionDescriptor {
                name: "inventory".into(),
                input_schema: serde_json::json!({ "type": "object" }),
                results_schema: serde_json::json!({ "type": "object" }),
            }],
        };
        Self { descriptor, clock }
    }
}

#[async_trait]
impl<C: Clock> Module for InventoryModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        let mut response = ActionResponse::metadata_from_request(request, ModuleType::Internal, &self.clock);
        let results = serde_json::json!({
            "facts": {
                "agent_version": env!("CARGO_PKG_VERSION"),
                "supported_pcp_versions": ["1", "2"],
            }
        });
        response.set_valid_results_and_end(results, &self.clock);
        Ok(response)
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
