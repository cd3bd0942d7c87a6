// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PCP/PXP wire protocol: chunk model and v1/v2 outbound message encoding
//! (spec.md §4.8, §6).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod chunk;
mod message;

pub use chunk::{
    parse_chunks, request_type_for, ChunkError, DataChunk, DebugChunk, Envelope, ParsedChunks,
    RawMessage, BLOCKING_REQUEST_MESSAGE_TYPE, NON_BLOCKING_REQUEST_MESSAGE_TYPE,
};
pub use message::{encode, EncodedMessage, OutboundMessage};
