// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in `ping` module: echoes a timestamp round-trip
//! (`src/agent/modules/ping.cpp`; §2 of SPEC_FULL.md).

use crate::error::ModuleError;
use crate::module::{ActionDescriptor, Module, ModuleDescriptor};
use async_trait::async_trait;
use pxp_core::{ActionRequest, ActionResponse, Clock, ModuleType};

pub struct PingModule<C: Clock> {
    descriptor: ModuleDescriptor,
    clock: C,
}

impl<C: Clock> PingModule<C> {
    pub fn new(clock: C) -> Self {
        let descriptor = ModuleDescriptor {
            name: "ping".into(),
            description: "Round-trip a timestamp to measure latency to the agent".into(),
            supports_async: false,
            actions: vec![ActionDescriptor {
                name: "ping".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "required": ["sender_timestamp"],
                    "properties": { "sender_timestamp": { "type": "string" } },
                }),
                results_schema: serde_json::json!({ "type": "object" }),
            }],
        };
        Self { descriptor, clock }
    }
}

#[async_trait]
impl<C: Clock> Module for PingModule<C> {
    fn describe(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Internal
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionResponse, ModuleError> {
        let sender_timestamp: i64 = request
            .params
            .get("sender_timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let agent_timestamp = self.clock.epoch_ms() as i64;

        let mut response = ActionResponse::metadata_from_request(request, ModuleType::Internal, &self.clock);
        let results = serde_json::json!({
            "time_to_agent": (agent_timestamp - sender_timestamp).to_string(),
            "agent_timestamp": agent_timestamp.to_string(),
        });
        response.set_valid_results_and_end(results, &self.clock);
        Ok(response)
    }
}

#[cfg(test)]
#[path = "ping_tests.rs"]
mod tests;
