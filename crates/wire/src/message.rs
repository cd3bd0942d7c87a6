// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound message shapes and dialect-specific encoding (spec.md §4.8, §6).
//!
//! Both dialects carry the same five message kinds; what differs is whether
//! a TTL accompanies the send and whether request `debug` chunks are echoed
//! back. v1 does both; v2 does neither.

use pxp_core::{ActionResponse, PcpVersion, RequestId, ResponseKind};
use serde_json::Value;

/// The five outbound message kinds the agent ever emits (spec.md §6).
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    ProvisionalResponse { in_reply_to: RequestId, transaction_id: String, debug: Vec<Value> },
    BlockingResponse { in_reply_to: RequestId, response: ActionResponse, debug: Vec<Value> },
    NonBlockingResponse { response: ActionResponse },
    StatusResponse { in_reply_to: RequestId, response: ActionResponse, debug: Vec<Value> },
    PxpError { in_reply_to: RequestId, description: String },
    PcpError { request_id: RequestId, description: String, endpoints: Vec<String> },
}

impl OutboundMessage {
    fn message_type(&self) -> &'static str {
        match self {
            OutboundMessage::ProvisionalResponse { .. } => {
                "http://puppetlabs.com/rpc_provisional_response"
            }
            OutboundMessage::BlockingResponse { .. } => "http://puppetlabs.com/rpc_blocking_response",
            OutboundMessage::NonBlockingResponse { .. } => {
                "http://puppetlabs.com/rpc_non_blocking_response"
            }
            OutboundMessage::StatusResponse { .. } => "http://puppetlabs.com/rpc_non_blocking_response",
            OutboundMessage::PxpError { .. } => "http://puppetlabs.com/pxp_error_message",
            OutboundMessage::PcpError { .. } => "http://puppetlabs.com/error_message",
        }
    }
}

/// A fully encoded outbound frame: the envelope fields plus the JSON body,
/// ready to be handed to the connector's transport.
#[derive(Debug, Clone)]
pub struct EncodedMessage {
    pub message_type: String,
    pub in_reply_to: Option<RequestId>,
    pub expires: Option<String>,
    pub body: Value,
    pub debug: Vec<Value>,
}

/// Encodes an [`OutboundMessage`] per the v1/v2 wire differences (spec.md §6).
pub fn encode(msg: OutboundMessage, version: PcpVersion, ttl_s: u64, clock_iso: &str) -> EncodedMessage {
    let message_type = msg.message_type().to_string();
    let expires = match version {
        PcpVersion::V1 => Some(expires_at(clock_iso, ttl_s)),
        PcpVersion::V2 => None,
    };

    match msg {
        OutboundMessage::ProvisionalResponse { in_reply_to, transaction_id, debug } => {
            EncodedMessage {
                message_type,
                in_reply_to: Some(in_reply_to),
                expires,
                body: serde_json::json!({ "transaction_id": transaction_id }),
                debug: echo_debug(version, debug),
            }
        }
        OutboundMessage::BlockingResponse { in_reply_to, response, debug } => EncodedMessage {
            message_type,
            in_reply_to: Some(in_reply_to),
            expires,
            body: response.to_wire(ResponseKind::Blocking),
            debug: echo_debug(version, debug),
        },
        OutboundMessage::StatusResponse { in_reply_to, response, debug } => EncodedMessage {
            message_type,
            in_reply_to: Some(in_reply_to),
            expires,
            body: response.to_wire(ResponseKind::StatusOutput),
            debug: echo_debug(version, debug),
        },
        OutboundMessage::NonBlockingResponse { response } => EncodedMessage {
            message_type,
            in_reply_to: None,
            expires,
            body: response.to_wire(ResponseKind::NonBlocking),
            debug: Vec::new(),
        },
        OutboundMessage::PxpError { in_reply_to, description } => EncodedMessage {
            message_type,
            in_reply_to: Some(in_reply_to.clone()),
            expires,
            body: serde_json::json!({ "id": in_reply_to, "description": description }),
            debug: Vec::new(),
        },
        OutboundMessage::PcpError { request_id, description, endpoints } => EncodedMessage {
            message_type,
            in_reply_to: Some(request_id),
            expires,
            body: serde_json::json!({ "description": description, "endpoints": endpoints }),
            debug: Vec::new(),
        },
    }
}

/// v1 echoes request debug on provisional/blocking/status sends; v2 never does
/// (spec.md §6, §4.8).
fn echo_debug(version: PcpVersion, debug: Vec<Value>) -> Vec<Value> {
    match version {
        PcpVersion::V1 => debug,
        PcpVersion::V2 => Vec::new(),
    }
}

/// Parse `now_iso` (produced by `Clock::iso8601_utc`) and add `ttl_s`,
/// falling back to the input unchanged if it somehow fails to parse.
fn expires_at(now_iso: &str, ttl_s: u64) -> String {
    match chrono::DateTime::parse_from_rfc3339(now_iso) {
        Ok(dt) => (dt + chrono::Duration::seconds(ttl_s as i64))
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string(),
        Err(_) => now_iso.to_string(),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
