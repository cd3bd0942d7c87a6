// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope / data / debug chunk model (spec.md §4.8 receive semantics, GLOSSARY).

use pxp_core::{RequestId, RequestType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The two inbound request message types the agent dispatches on (spec.md
/// §6); anything else (e.g. an association reply echoed back) is not a
/// request and is ignored by the processor.
pub const BLOCKING_REQUEST_MESSAGE_TYPE: &str = "http://puppetlabs.com/rpc_blocking_request";
pub const NON_BLOCKING_REQUEST_MESSAGE_TYPE: &str = "http://puppetlabs.com/rpc_non_blocking_request";

/// Classify an inbound `message_type` as a request dispatch shape, or `None`
/// if it isn't a request this agent acts on.
pub fn request_type_for(message_type: &str) -> Option<RequestType> {
    match message_type {
        BLOCKING_REQUEST_MESSAGE_TYPE => Some(RequestType::Blocking),
        NON_BLOCKING_REQUEST_MESSAGE_TYPE => Some(RequestType::NonBlocking),
        _ => None,
    }
}

/// Routing and identity information carried by every PCP message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    #[serde(default)]
    pub target: Vec<String>,
    pub message_type: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<RequestId>,
    /// v1-only TTL expiry timestamp; unset under v2 (spec.md §6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

/// The JSON payload chunk. The content type is checked before the handler
/// ever sees it (spec.md §4.8: "malformed frames trigger a PCP-level error
/// reply, not a handler invocation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataChunk {
    pub content_type: String,
    pub payload: Value,
}

/// An optional diagnostic breadcrumb. Individually malformed debug chunks
/// are counted and logged, never fatal to the message as a whole
/// (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugChunk {
    pub payload: Value,
}

/// A fully decoded inbound message: one envelope, at most one data chunk,
/// zero or more debug chunks (some possibly malformed).
#[derive(Debug, Clone)]
pub struct ParsedChunks {
    pub envelope: Envelope,
    pub data: DataChunk,
    pub debug: Vec<Value>,
    /// Count of debug sub-chunks that failed to parse as JSON objects.
    pub malformed_debug_count: usize,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("message has no data chunk")]
    MissingDataChunk,

    #[error("data chunk has unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("data chunk payload is not valid JSON: {0}")]
    InvalidDataPayload(String),
}

const JSON_CONTENT_TYPE: &str = "application/json";

/// Raw wire shape of an inbound message before chunk validation: an envelope
/// plus optional raw data/debug JSON blobs exactly as read off the socket.
pub struct RawMessage {
    pub envelope: Envelope,
    pub data: Option<Value>,
    pub data_content_type: Option<String>,
    pub debug: Vec<Value>,
}

/// Validate presence of the data chunk and its content type, and count
/// malformed debug sub-chunks without failing the whole message
/// (spec.md §4.8).
pub fn parse_chunks(raw: RawMessage) -> Result<ParsedChunks, ChunkError> {
    let payload = raw.data.ok_or(ChunkError::MissingDataChunk)?;
    let content_type = raw.data_content_type.unwrap_or_default();
    if content_type != JSON_CONTENT_TYPE {
        return Err(ChunkError::UnsupportedContentType(content_type));
    }
    if !payload.is_object() {
        return Err(ChunkError::InvalidDataPayload("top-level data chunk must be a JSON object".into()));
    }

    let mut debug = Vec::with_capacity(raw.debug.len());
    let mut malformed_debug_count = 0;
    for item in raw.debug {
        if item.is_object() {
            debug.push(item);
        } else {
            malformed_debug_count += 1;
        }
    }

    Ok(ParsedChunks {
        envelope: raw.envelope,
        data: DataChunk { content_type, payload },
        debug,
        malformed_debug_count,
    })
}

#[cfg(test)]
#[path = "chunk_tests.rs"]
mod tests;
