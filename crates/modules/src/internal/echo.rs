// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in `echo` module: returns its input unchanged. Useful for
//! smoke-testing a fresh agent against a broker (§2 of SPEC_FULL.md).

use crate::error::ModuleError;
use crate::module::{ActionDescriptor, Module, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{ActionRequest, ActionResponse, Clock, ModuleType};

pub struct EchoModule<C: Clock> {
    descriptor: ModuleDescriptor,
    clock: C,
}

impl<C: Clock> EchoModule<C> {
    pub fn new(clock: C) -> Self {
        let descriptor = ModuleDescriptor {
            name: "echo".into(),
            description: "Echo the input params back as results".into(),
            supports_async: false,
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
impl<C: Clock> Module for EchoModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        let mut response = ActionResponse::metadata_from_request(request, ModuleType::Internal, &self.clock);
        response.set_valid_results_and_end(request.params.clone(), &self.clock);
        Ok(response)
    }
}

#[cfg(test)]
#[path = "echo_tests.rs"]
mod tests;
