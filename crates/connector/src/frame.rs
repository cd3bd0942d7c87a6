// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serializes [`pxp_wire::EncodedMessage`] onto the wire and decodes inbound
//! WebSocket text frames back into [`pxp_wire::ParsedChunks`] (spec.md §4.8).

use pxp_core::RequestId;
use pxp_wire::{parse_chunks, ChunkError, EncodedMessage, Envelope, ParsedChunks, RawMessage};
use serde_json::Value;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Render an [`EncodedMessage`] as the JSON text frame sent over the
/// WebSocket: `{envelope, data, debug}` (spec.md §3 "Envelope / data / debug
/// chunks").
pub fn render(msg: EncodedMessage, sender: &str, target: Vec<String>, id: RequestId) -> String {
    let envelope = Envelope {
        sender: sender.to_string(),
        target,
        message_type: msg.message_type,
        id,
        in_reply_to: msg.in_reply_to,
        expires: msg.expires,
    };
    let frame = serde_json::json!({
        "envelope": envelope,
        "data": { "content_type": JSON_CONTENT_TYPE, "payload": msg.body },
        "debug": msg.debug,
    });
    frame.to_string()
}

/// Parse an inbound WebSocket text frame into validated chunks. A JSON
/// parse failure here is the wire-level analogue of "message has no data
/// chunk" — reject before the handler ever sees it (spec.md §4.8 "Receive
/// semantics").
pub fn parse(text: &str) -> Result<ParsedChunks, ChunkError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ChunkError::InvalidDataPayload(e.to_string()))?;

    let envelope: Envelope = serde_json::from_value(value.get("envelope").cloned().unwrap_or(Value::Null))
        .map_err(|e| ChunkError::InvalidDataPayload(format!("bad envelope: {e}")))?;

    let data = value.get("data");
    let data_content_type = data.and_then(|d| d.get("content_type")).and_then(|v| v.as_str()).map(str::to_string);
    let data_payload = data.and_then(|d| d.get("payload")).cloned();

    let debug = value.get("debug").and_then(|v| v.as_array()).cloned().unwrap_or_default();

    parse_chunks(RawMessage { envelope, data: data_payload, data_content_type, debug })
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
