// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connector error taxonomy (spec.md §4.8).

use thiserror::Error;

/// `Fatal` surfaces configuration problems the caller cannot retry past
/// (bad TLS material, unsupported PCP version); `Transport` covers anything
/// the connect loop is expected to retry (spec.md §4.8 "Connect loop").
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("fatal connector configuration error: {0}")]
    Fatal(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("association with broker failed: {0}")]
    Association(String),
}
